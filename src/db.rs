use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{Branch, ResponseRecord, Survey};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    fn ts(m: u32, d: u32, h: u32, min: u32) -> anyhow::Result<DateTime<Utc>> {
        Ok(NaiveDate::from_ymd_opt(2026, m, d)
            .context("invalid date")?
            .and_hms_opt(h, min, 0)
            .context("invalid time")?
            .and_utc())
    }

    let branches = vec![
        ("piazza", "Piazza"),
        ("centro", "Centro"),
        ("portales", "Portales"),
    ];

    for (code, name) in branches {
        upsert_branch(pool, code, name).await?;
    }

    let piazza_survey = Uuid::parse_str("7b1f4c8a-52d3-4f0e-9a6b-1c2d3e4f5a6b")?;
    let centro_survey = Uuid::parse_str("9e8d7c6b-5a49-4382-b1c0-d9e8f7a6b5c4")?;
    let surveys = vec![
        (
            piazza_survey,
            "piazza",
            "Experiencia en barra",
            "https://tally.so/r/3xKmPz",
        ),
        (
            centro_survey,
            "centro",
            "Visita en salón",
            "https://tally.so/r/wQ8dYn",
        ),
    ];

    for (id, branch_code, title, form_url) in surveys {
        sqlx::query(
            r#"
            INSERT INTO branch_experience.surveys (id, branch_code, title, form_url)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET title = EXCLUDED.title, form_url = EXCLUDED.form_url
            "#,
        )
        .bind(id)
        .bind(branch_code)
        .bind(title)
        .bind(form_url)
        .execute(pool)
        .await?;
    }

    let scans: Vec<(Uuid, &str, DateTime<Utc>)> = vec![
        (piazza_survey, "piazza", ts(2, 2, 8, 40)?),
        (piazza_survey, "piazza", ts(2, 2, 12, 15)?),
        (piazza_survey, "piazza", ts(2, 3, 17, 5)?),
        (centro_survey, "centro", ts(2, 3, 10, 20)?),
    ];

    for (survey_id, branch_code, scanned_at) in scans {
        sqlx::query(
            r#"
            INSERT INTO branch_experience.qr_scans (id, survey_id, branch_code, scanned_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(survey_id)
        .bind(branch_code)
        .bind(scanned_at)
        .execute(pool)
        .await?;
    }

    let responses: Vec<(
        &str,
        &str,
        bool,
        bool,
        bool,
        Option<i32>,
        Option<f64>,
        Option<&str>,
        DateTime<Utc>,
    )> = vec![
        (
            "seed-001",
            "piazza",
            true,
            true,
            true,
            Some(9),
            Some(5.0),
            Some("Excelente café, volvería todos los días"),
            ts(2, 2, 9, 5)?,
        ),
        (
            "seed-002",
            "piazza",
            true,
            true,
            true,
            Some(7),
            Some(4.0),
            None,
            ts(2, 2, 12, 30)?,
        ),
        (
            "seed-003",
            "piazza",
            true,
            true,
            false,
            None,
            None,
            None,
            ts(2, 3, 17, 10)?,
        ),
        (
            "seed-004",
            "centro",
            true,
            true,
            true,
            Some(2),
            Some(2.0),
            Some("La fila estaba muy larga"),
            ts(2, 3, 10, 45)?,
        ),
        (
            "seed-005",
            "centro",
            true,
            false,
            false,
            None,
            None,
            None,
            ts(2, 4, 8, 15)?,
        ),
    ];

    for (source_key, branch_code, opened, started, completed, nps, csat, comment, submitted_at) in
        responses
    {
        sqlx::query(
            r#"
            INSERT INTO branch_experience.survey_responses
            (id, branch_code, opened, started, completed, nps_score, csat_score, comment, submitted_at, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(branch_code)
        .bind(opened)
        .bind(started)
        .bind(completed)
        .bind(nps)
        .bind(csat)
        .bind(comment)
        .bind(submitted_at)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn upsert_branch(pool: &PgPool, code: &str, name: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO branch_experience.branches (code, name)
        VALUES ($1, $2)
        ON CONFLICT (code) DO UPDATE
        SET name = EXCLUDED.name
        "#,
    )
    .bind(code)
    .bind(name)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_branches(pool: &PgPool) -> anyhow::Result<Vec<Branch>> {
    let rows = sqlx::query(
        "SELECT code, name FROM branch_experience.branches ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Branch {
            code: row.get("code"),
            name: row.get("name"),
        })
        .collect())
}

pub async fn remove_branch(pool: &PgPool, code: &str) -> anyhow::Result<u64> {
    let result = sqlx::query("DELETE FROM branch_experience.branches WHERE code = $1")
        .bind(code)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn add_survey(
    pool: &PgPool,
    branch_code: &str,
    title: &str,
    form_url: &str,
) -> anyhow::Result<Uuid> {
    let row = sqlx::query(
        r#"
        INSERT INTO branch_experience.surveys (id, branch_code, title, form_url)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(branch_code)
    .bind(title)
    .bind(form_url)
    .fetch_one(pool)
    .await?;
    Ok(row.get("id"))
}

pub async fn list_surveys(pool: &PgPool) -> anyhow::Result<Vec<Survey>> {
    let rows = sqlx::query(
        "SELECT id, branch_code, title, form_url, created_at \
         FROM branch_experience.surveys ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Survey {
            id: row.get("id"),
            branch_code: row.get("branch_code"),
            title: row.get("title"),
            form_url: row.get("form_url"),
            created_at: row.get("created_at"),
        })
        .collect())
}

pub async fn remove_survey(pool: &PgPool, id: Uuid) -> anyhow::Result<u64> {
    let result = sqlx::query("DELETE FROM branch_experience.surveys WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Log one scan of a survey's QR link and hand back the form URL the
/// scanner should land on.
pub async fn record_scan(
    pool: &PgPool,
    survey_id: Uuid,
    referer: Option<&str>,
    user_agent: Option<&str>,
) -> anyhow::Result<String> {
    let survey = sqlx::query(
        "SELECT branch_code, form_url FROM branch_experience.surveys WHERE id = $1",
    )
    .bind(survey_id)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("survey {survey_id} not found"))?;

    let branch_code: String = survey.get("branch_code");
    let form_url: String = survey.get("form_url");

    sqlx::query(
        r#"
        INSERT INTO branch_experience.qr_scans (id, survey_id, branch_code, referer, user_agent)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(survey_id)
    .bind(branch_code)
    .bind(referer)
    .bind(user_agent)
    .execute(pool)
    .await?;

    Ok(form_url)
}

fn response_from_row(row: &PgRow) -> ResponseRecord {
    ResponseRecord {
        id: row.get("id"),
        branch_code: row.get("branch_code"),
        opened: row.get("opened"),
        started: row.get("started"),
        completed: row.get("completed"),
        nps_score: row.get("nps_score"),
        csat_score: row.get("csat_score"),
        comment: row.get("comment"),
        submitted_at: row.get("submitted_at"),
    }
}

pub async fn fetch_responses(
    pool: &PgPool,
    since: DateTime<Utc>,
    branch: Option<&str>,
) -> anyhow::Result<Vec<ResponseRecord>> {
    let mut query = String::from(
        "SELECT id, branch_code, opened, started, completed, \
         nps_score, csat_score, comment, submitted_at \
         FROM branch_experience.survey_responses \
         WHERE submitted_at >= $1",
    );

    if branch.is_some() {
        query.push_str(" AND branch_code = $2");
    }
    query.push_str(" ORDER BY submitted_at");

    let mut rows = sqlx::query(&query).bind(since);
    if let Some(value) = branch {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    Ok(records.iter().map(response_from_row).collect())
}

pub async fn fetch_recent_responses(
    pool: &PgPool,
    branch: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<ResponseRecord>> {
    let mut query = String::from(
        "SELECT id, branch_code, opened, started, completed, \
         nps_score, csat_score, comment, submitted_at \
         FROM branch_experience.survey_responses",
    );

    if branch.is_some() {
        query.push_str(" WHERE branch_code = $2");
    }
    query.push_str(" ORDER BY submitted_at DESC LIMIT $1");

    let mut rows = sqlx::query(&query).bind(limit);
    if let Some(value) = branch {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    Ok(records.iter().map(response_from_row).collect())
}

/// Scan-log count for the window; the open-rate baseline.
pub async fn fetch_invitation_count(
    pool: &PgPool,
    since: DateTime<Utc>,
    branch: Option<&str>,
) -> anyhow::Result<u64> {
    let mut query = String::from(
        "SELECT COUNT(*) AS scans FROM branch_experience.qr_scans WHERE scanned_at >= $1",
    );

    if branch.is_some() {
        query.push_str(" AND branch_code = $2");
    }

    let mut rows = sqlx::query(&query).bind(since);
    if let Some(value) = branch {
        rows = rows.bind(value);
    }

    let count: i64 = rows.fetch_one(pool).await?.get("scans");
    Ok(count as u64)
}

#[derive(Debug, serde::Deserialize)]
struct CsvResponseRow {
    branch_code: String,
    opened: bool,
    started: bool,
    completed: bool,
    nps_score: Option<i32>,
    csat_score: Option<f64>,
    comment: Option<String>,
    submitted_at: DateTime<Utc>,
    source_key: Option<String>,
}

fn read_response_rows<R: std::io::Read>(input: R) -> anyhow::Result<Vec<CsvResponseRow>> {
    let mut reader = csv::Reader::from_reader(input);
    let mut rows = Vec::new();
    for result in reader.deserialize::<CsvResponseRow>() {
        rows.push(result?);
    }
    Ok(rows)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows = read_response_rows(file)?;
    let mut inserted = 0usize;

    for row in rows {
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO branch_experience.survey_responses
            (id, branch_code, opened, started, completed, nps_score, csat_score, comment, submitted_at, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.branch_code)
        .bind(row.opened)
        .bind(row.started)
        .bind(row.completed)
        .bind(row.nps_score)
        .bind(row.csat_score)
        .bind(&row.comment)
        .bind(row.submitted_at)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_rows_parse_scores_and_gaps() {
        let data = "\
branch_code,opened,started,completed,nps_score,csat_score,comment,submitted_at,source_key
piazza,true,true,true,9,4.5,Buen servicio,2026-02-02T15:30:00Z,resp-001
centro,true,false,false,,,,2026-02-03T09:10:00Z,
";

        let rows = read_response_rows(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].branch_code, "piazza");
        assert!(rows[0].completed);
        assert_eq!(rows[0].nps_score, Some(9));
        assert_eq!(rows[0].csat_score, Some(4.5));
        assert_eq!(rows[0].comment.as_deref(), Some("Buen servicio"));
        assert_eq!(rows[0].source_key.as_deref(), Some("resp-001"));

        assert!(rows[1].opened);
        assert!(!rows[1].started);
        assert_eq!(rows[1].nps_score, None);
        assert_eq!(rows[1].csat_score, None);
        assert_eq!(rows[1].comment, None);
        assert_eq!(rows[1].source_key, None);
    }

    #[test]
    fn csv_rejects_malformed_rows() {
        let data = "\
branch_code,opened,started,completed,nps_score,csat_score,comment,submitted_at,source_key
piazza,yes,true,true,9,4.5,,2026-02-02T15:30:00Z,resp-001
";
        assert!(read_response_rows(data.as_bytes()).is_err());
    }
}
