//! Bio Import Service - Parses biography text files into structured entries
//!
//! Responsibilities:
//! - Walk a directory of .md biography files
//! - Split each file into expert sections on the --- delimiter
//! - Parse labeled Experience/Education blocks into typed entries
//! - Skip sections whose expert id is unknown to the registry
//! - Insert each section's entries atomically and report counts
//!
//! Exit status: 0 on a clean run, 2 when some files or sections failed,
//! 1 on a setup failure before processing started.

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

const ERROR_LOG_PATH: &str = "./bio_import_errors.log";

/// End tokens marking an open-ended experience range.
const PRESENT_TOKENS: &[&str] = &["present", "current", "ongoing"];

#[derive(Parser, Debug)]
#[command(name = "bio-import", about = "Imports expert biography files into the registry database")]
struct Args {
    /// Directory of biography .md files
    #[arg(long, default_value = "./bios")]
    bios: String,

    /// Dry run - don't save to database
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

// =============================================================================
// Parsed entry types
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
struct ExperienceEntry {
    start_date: String,
    end_date: String,
    is_current: bool,
    position: String,
    organization: String,
    country: String,
    description: String,
}

#[derive(Debug, Clone, PartialEq)]
struct EducationEntry {
    graduation_year: String,
    degree: String,
    institution: String,
    field_of_study: String,
    country: String,
    description: String,
}

/// One expert's block of a biography file.
#[derive(Debug, Clone, PartialEq)]
struct BioSection {
    expert_id: i64,
    name: String,
    experience: Vec<ExperienceEntry>,
    education: Vec<EducationEntry>,
}

// =============================================================================
// Line parsers
// =============================================================================

/// Extract the first run of digits from an identity token ("E321" -> 321).
fn extract_expert_id(raw: &str) -> Option<i64> {
    let digits: String = raw
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

/// Parse one experience line: `start[-end]: position[, organization[, country]]`.
/// An end token matching a present synonym marks the entry open-ended.
fn parse_experience_line(line: &str) -> Option<ExperienceEntry> {
    let line = line.trim();
    if line.is_empty() || line.starts_with("Experience:") {
        return None;
    }
    let (date_part, rest_part) = line.split_once(':')?;
    let date_part = date_part.trim();
    let rest_part = rest_part.trim();

    let mut start_date = String::new();
    let mut end_date = String::new();
    let mut is_current = false;
    if !date_part.is_empty() {
        match date_part.split_once('-') {
            Some((start, end)) => {
                start_date = start.trim().to_string();
                end_date = end.trim().to_string();
                if PRESENT_TOKENS.contains(&end_date.to_lowercase().as_str()) {
                    is_current = true;
                    end_date.clear();
                }
            }
            None => start_date = date_part.to_string(),
        }
    }

    let mut position = String::new();
    let mut organization = String::new();
    let mut country = String::new();
    if !rest_part.is_empty() {
        let parts: Vec<&str> = rest_part.split(',').collect();
        if parts.len() >= 3 {
            position = parts[0].trim().to_string();
            organization = parts[1].trim().to_string();
            country = parts[2].trim().to_string();
        } else if parts.len() == 2 {
            position = parts[0].trim().to_string();
            organization = parts[1].trim().to_string();
        } else {
            position = rest_part.to_string();
        }
    }

    Some(ExperienceEntry {
        start_date,
        end_date,
        is_current,
        position,
        organization,
        country,
        description: String::new(),
    })
}

/// Parse one education line: `year: degree[, institution[, country]]`.
fn parse_education_line(line: &str) -> Option<EducationEntry> {
    let line = line.trim();
    if line.is_empty() || line.starts_with("Education:") {
        return None;
    }
    let (year_part, rest_part) = line.split_once(':')?;
    let year_part = year_part.trim();
    let rest_part = rest_part.trim();

    let mut degree = String::new();
    let mut institution = String::new();
    let mut country = String::new();
    if !rest_part.is_empty() {
        let parts: Vec<&str> = rest_part.split(',').collect();
        if parts.len() >= 3 {
            degree = parts[0].trim().to_string();
            institution = parts[1].trim().to_string();
            country = parts[2].trim().to_string();
        } else if parts.len() == 2 {
            degree = parts[0].trim().to_string();
            institution = parts[1].trim().to_string();
        } else {
            degree = rest_part.to_string();
        }
    }

    Some(EducationEntry {
        graduation_year: year_part.to_string(),
        degree,
        institution,
        field_of_study: String::new(),
        country,
        description: String::new(),
    })
}

// =============================================================================
// Document parser
// =============================================================================

/// Split a biography document into expert sections. Blank sections are
/// ignored; a section without a recoverable identity is dropped whole.
/// Deterministic: re-parsing the same text yields the same sections.
fn parse_document(text: &str) -> Vec<BioSection> {
    #[derive(Clone, Copy, PartialEq)]
    enum Block {
        None,
        Experience,
        Education,
    }

    let mut sections = Vec::new();
    for raw_section in text.split("---") {
        let lines: Vec<&str> = raw_section
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if lines.len() < 2 {
            continue;
        }

        let mut expert_id: Option<i64> = None;
        let mut name = String::new();
        let mut experience = Vec::new();
        let mut education = Vec::new();
        let mut block = Block::None;

        for line in lines {
            if let Some(rest) = line.strip_prefix("ID:") {
                match extract_expert_id(rest) {
                    Some(id) => expert_id = Some(id),
                    None => eprintln!("Warning: unparseable identity line '{}'", line),
                }
            } else if let Some(rest) = line.strip_prefix("Name:") {
                name = rest.trim().to_string();
            } else if line.starts_with("Education:") {
                block = Block::Education;
            } else if line.starts_with("Experience:") {
                block = Block::Experience;
            } else if block == Block::Experience {
                if let Some(entry) = parse_experience_line(line) {
                    experience.push(entry);
                }
            } else if block == Block::Education {
                if let Some(entry) = parse_education_line(line) {
                    education.push(entry);
                }
            }
        }

        if let Some(id) = expert_id {
            sections.push(BioSection {
                expert_id: id,
                name,
                experience,
                education,
            });
        }
    }
    sections
}

// =============================================================================
// Storage
// =============================================================================

/// Insert one section's entries inside a single transaction: a section is
/// applied whole or not at all.
async fn insert_section(pool: &PgPool, section: &BioSection) -> Result<(usize, usize)> {
    let mut tx = pool.begin().await?;

    for entry in &section.experience {
        sqlx::query(
            "INSERT INTO expert_experience_entries \
             (expert_id, organization, position, start_date, end_date, is_current, country, description) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(section.expert_id)
        .bind(&entry.organization)
        .bind(&entry.position)
        .bind(&entry.start_date)
        .bind(&entry.end_date)
        .bind(entry.is_current)
        .bind(&entry.country)
        .bind(&entry.description)
        .execute(&mut *tx)
        .await?;
    }

    for entry in &section.education {
        sqlx::query(
            "INSERT INTO expert_education_entries \
             (expert_id, institution, degree, field_of_study, graduation_year, country, description) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(section.expert_id)
        .bind(&entry.institution)
        .bind(&entry.degree)
        .bind(&entry.field_of_study)
        .bind(&entry.graduation_year)
        .bind(&entry.country)
        .bind(&entry.description)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok((section.experience.len(), section.education.len()))
}

async fn expert_exists(pool: &PgPool, expert_id: i64) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM experts WHERE id = $1")
        .bind(expert_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Create an import_runs row for this invocation.
async fn create_import_run(pool: &PgPool, component: &str) -> Result<Uuid> {
    let run_id = Uuid::new_v4();
    sqlx::query("INSERT INTO import_runs (run_id, component, status, detail) VALUES ($1, $2, 'running', '{}')")
        .bind(run_id)
        .bind(component)
        .execute(pool)
        .await?;
    Ok(run_id)
}

async fn finish_import_run(
    pool: &PgPool,
    run_id: Uuid,
    status: &str,
    error: Option<&str>,
    detail: serde_json::Value,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE import_runs
        SET finished_at = now(), status = $2, error = $3, detail = detail || $4
        WHERE run_id = $1
        "#,
    )
    .bind(run_id)
    .bind(status)
    .bind(error)
    .bind(detail)
    .execute(pool)
    .await?;
    Ok(())
}

async fn write_error_log(errors: &[String]) -> Result<()> {
    let mut out = String::from("Bio Import Error Log\n====================\n\n");
    for error in errors {
        out.push_str(error);
        out.push('\n');
    }
    fs::write(ERROR_LOG_PATH, out)
        .await
        .context("Failed to write error log")?;
    Ok(())
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let db_url = std::env::var("DB_URL").context("DB_URL env var missing")?;

    println!("=== Expert Bio Import ===");
    println!("Bio directory: {}", args.bios);
    if args.dry_run {
        println!("Dry run - nothing will be saved");
    }

    if !Path::new(&args.bios).is_dir() {
        anyhow::bail!("Bio directory '{}' not found", args.bios);
    }

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await
        .context("Failed to connect to database")?;

    let run_id = if !args.dry_run {
        Some(create_import_run(&pool, "bio-import").await?)
    } else {
        None
    };

    // Collect .md files in name order so runs are reproducible.
    let mut bio_files: Vec<std::path::PathBuf> = Vec::new();
    let mut dir = fs::read_dir(&args.bios)
        .await
        .with_context(|| format!("Failed to read bio directory '{}'", args.bios))?;
    while let Some(entry) = dir.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("md") {
            bio_files.push(path);
        }
    }
    bio_files.sort();
    println!("Found {} bio files", bio_files.len());

    let mut experts_matched = 0usize;
    let mut experts_skipped = 0usize;
    let mut experience_inserted = 0usize;
    let mut education_inserted = 0usize;
    let mut errors: Vec<String> = Vec::new();

    for path in &bio_files {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        println!("\nProcessing {}...", file_name);

        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                let msg = format!("{}: read failed: {}", file_name, e);
                eprintln!("{}", msg);
                errors.push(msg);
                continue;
            }
        };

        for section in parse_document(&content) {
            if !expert_exists(&pool, section.expert_id).await? {
                println!(
                    "  Expert {} not found in database, skipping section",
                    section.expert_id
                );
                experts_skipped += 1;
                continue;
            }

            if args.dry_run {
                experts_matched += 1;
                experience_inserted += section.experience.len();
                education_inserted += section.education.len();
                continue;
            }

            match insert_section(&pool, &section).await {
                Ok((exp, edu)) => {
                    experts_matched += 1;
                    experience_inserted += exp;
                    education_inserted += edu;
                }
                Err(e) => {
                    let msg = format!(
                        "{}: expert {}: section rolled back: {}",
                        file_name, section.expert_id, e
                    );
                    eprintln!("  {}", msg);
                    errors.push(msg);
                }
            }
        }
    }

    if let Some(run_id) = run_id {
        let status = if errors.is_empty() { "ok" } else { "partial" };
        let detail = serde_json::json!({
            "experts": experts_matched,
            "experience_entries": experience_inserted,
            "education_entries": education_inserted,
            "skipped": experts_skipped,
            "failed": errors.len(),
        });
        finish_import_run(&pool, run_id, status, None, detail).await?;
    }

    println!("\n==================================================");
    println!("BIO IMPORT COMPLETE");
    println!("==================================================");
    println!("Experts processed: {}", experts_matched);
    println!("Experts skipped (not in database): {}", experts_skipped);
    println!("Experience entries inserted: {}", experience_inserted);
    println!("Education entries inserted: {}", education_inserted);
    println!("Errors encountered: {}", errors.len());

    if !errors.is_empty() {
        write_error_log(&errors).await?;
        println!("Error log written to: {}", ERROR_LOG_PATH);
        pool.close().await;
        std::process::exit(2);
    }

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
