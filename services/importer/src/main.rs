//! Importer Service - Normalizes the expert CSV into the registry database
//!
//! Responsibilities:
//! - Stream the experts CSV (BOM-tolerant, fuzzy column headers)
//! - Resolve free-text general areas against the expert_areas taxonomy
//! - Split specialized areas into tags and upsert them, collecting ids
//! - Apply transformed records in fixed-size transactional batches
//! - Track the run in import_runs and write an error log when records fail
//!
//! Alternate mode (--cvs): register CV documents named ID####.pdf against
//! existing experts instead of importing tabular rows.
//!
//! Exit status: 0 on a clean run, 2 when some records were skipped or
//! rolled back, 1 on a setup failure before processing started.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

/// Row cap applied by --test mode.
const TEST_LIMIT: usize = 10;

const SYSTEM_USER_NAME: &str = "SYSTEM";
const SYSTEM_USER_EMAIL: &str = "system@expertdb.internal";

const ERROR_LOG_PATH: &str = "./import_errors.log";
const CV_ERROR_LOG_PATH: &str = "./cv_import_errors.log";

#[derive(Parser, Debug)]
#[command(name = "importer", about = "Imports the expert CSV into the registry database")]
struct Args {
    /// Path to the experts CSV file
    #[arg(long, default_value = "./files/experts.csv")]
    csv: String,

    /// JSON rules file overriding the built-in area resolution rules
    #[arg(long)]
    rules: Option<String>,

    /// Records per transactional batch
    #[arg(long, default_value = "100")]
    batch_size: usize,

    /// Test mode - process only the first 10 data rows
    #[arg(long, default_value = "false")]
    test: bool,

    /// CV import mode - register ID####.pdf documents instead of CSV rows
    #[arg(long, default_value = "false")]
    cvs: bool,

    /// Directory scanned in CV import mode
    #[arg(long, default_value = "./data/documents/cvs")]
    cv_dir: String,

    /// How flag columns with no recognizable yes/no text are stored
    #[arg(long, value_enum, default_value_t = AbsentFlags::False)]
    absent_flags: AbsentFlags,

    /// Dry run - don't save to database
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

// =============================================================================
// Resolution rules
// =============================================================================
// Taxonomy ids differ between deployments, so the keyword fallback table and
// the default area id ship as configuration (--rules) with these defaults.

#[derive(Debug, Clone, Deserialize)]
struct ImportRules {
    /// Area id used when every resolution tier misses.
    default_area_id: i64,
    /// Keyword (matched by containment in the lowercased input) -> area id.
    #[serde(default)]
    fallback_areas: Vec<FallbackArea>,
    /// Raw specialized-area tag -> one or more canonical tags.
    #[serde(default)]
    expansions: Vec<TagExpansion>,
}

#[derive(Debug, Clone, Deserialize)]
struct FallbackArea {
    keyword: String,
    area_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct TagExpansion {
    from: String,
    to: Vec<String>,
}

impl Default for ImportRules {
    fn default() -> Self {
        let fallback = |keyword: &str, area_id: i64| FallbackArea {
            keyword: keyword.to_string(),
            area_id,
        };
        let expand = |from: &str, to: &[&str]| TagExpansion {
            from: from.to_string(),
            to: to.iter().map(|t| t.to_string()).collect(),
        };
        // Order matters: longer keywords first so "information technology"
        // wins before "it" gets a chance to match by containment.
        ImportRules {
            default_area_id: 1,
            fallback_areas: vec![
                fallback("business", 1),
                fallback("education", 12),
                fallback("engineering", 14),
                fallback("information technology", 25),
                fallback("it", 25),
                fallback("science", 26),
                fallback("medical", 35),
                fallback("law", 39),
                fallback("art", 40),
                fallback("design", 40),
                fallback("aviation", 44),
                fallback("health", 45),
            ],
            expansions: vec![
                expand("IT", &["Information Technology"]),
                expand("Business Adminstration", &["Business Administration"]),
                expand("Human Resource", &["Human Resources"]),
                expand("Banking and Finance", &["Banking", "Finance"]),
                expand("Accounting and Finance", &["Accounting", "Finance"]),
                expand("Marketing and Management", &["Marketing", "Management"]),
                expand(
                    "Process Instrumentation and Control Engineering",
                    &["Process Engineering"],
                ),
                expand(
                    "Electrical and Electronics Engineering",
                    &["Electrical Engineering", "Electronics Engineering"],
                ),
                expand(
                    "Electrical & Electronics Engineering",
                    &["Electrical Engineering", "Electronics Engineering"],
                ),
                expand("SAP Analyst", &["Information Technology"]),
                expand("Team Management", &["Management"]),
                expand("Supervisory", &["Management"]),
                expand("Article writer", &["Writing"]),
                expand("Comparative Jurisprudence", &["Jurisprudence"]),
                expand("Shari'ah", &["Islamic Law"]),
                expand("Consultant", &["Consulting"]),
                expand("Surgical and Medical Instrument", &["Medical Instrumentation"]),
                expand("enviormental engineering", &["Environmental Engineering"]),
                expand("Multimedia Technology", &["Multimedia"]),
                expand("Artificial Inteligence", &["Artificial Intelligence"]),
                expand("Acturial Science", &["Actuarial Science"]),
                expand(
                    "Anti-Money Laundering and Compliance",
                    &["Anti-Money Laundering"],
                ),
            ],
        }
    }
}

/// Load a rules file, normalizing fallback keywords to lowercase.
async fn load_rules(path: &str) -> Result<ImportRules> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read rules file '{}'", path))?;
    let mut rules: ImportRules =
        serde_json::from_str(&content).context("Failed to parse rules file")?;
    for rule in &mut rules.fallback_areas {
        rule.keyword = rule.keyword.to_lowercase();
    }
    Ok(rules)
}

// =============================================================================
// Raw records and the field accessor
// =============================================================================

/// One CSV data row zipped with the header row. Surplus cells from rows
/// longer than the header carry no key and never match a lookup.
#[derive(Debug)]
struct RawRecord {
    fields: Vec<(Option<String>, Option<String>)>,
}

/// Strip the UTF-8 BOM artifact and surrounding whitespace from a header.
fn clean_key(key: &str) -> &str {
    key.trim_start_matches('\u{feff}').trim()
}

fn trimmed_non_empty(value: Option<&str>) -> Option<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Some(v.to_string()),
        _ => None,
    }
}

impl RawRecord {
    fn from_csv(headers: &csv::StringRecord, record: &csv::StringRecord) -> Self {
        let fields = record
            .iter()
            .enumerate()
            .map(|(idx, value)| {
                let key = headers.get(idx).map(|h| h.to_string());
                (key, trimmed_non_empty(Some(value)))
            })
            .collect();
        RawRecord { fields }
    }

    /// Look up a logical column: first a case-insensitive exact match on the
    /// cleaned key, then a case-insensitive substring match. The first key
    /// that matches decides, even if its cell is empty.
    fn get(&self, logical: &str) -> Option<String> {
        let want = logical.trim().to_lowercase();
        for (key, value) in &self.fields {
            let Some(key) = key else { continue };
            if clean_key(key).to_lowercase() == want {
                return trimmed_non_empty(value.as_deref());
            }
        }
        for (key, value) in &self.fields {
            let Some(key) = key else { continue };
            if clean_key(key).to_lowercase().contains(&want) {
                return trimmed_non_empty(value.as_deref());
            }
        }
        None
    }

    fn get_or(&self, logical: &str, default: &str) -> String {
        self.get(logical).unwrap_or_else(|| default.to_string())
    }
}

// =============================================================================
// Text normalization
// =============================================================================

/// Canonicalize free text for matching: collapse whitespace runs, pad
/// hyphens with single spaces, trim. Idempotent.
fn normalize_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let spaced = collapsed.replace('-', " - ").replace("  ", " ");
    spaced.trim().to_string()
}

// =============================================================================
// Taxonomy cache and resolution
// =============================================================================

/// In-memory name -> id lookup for one taxonomy table. Keys both the raw
/// and the normalized name so either form resolves. BTreeMap keeps the
/// containment scan deterministic.
#[derive(Debug, Default)]
struct AreaCache {
    by_name: BTreeMap<String, i64>,
}

impl AreaCache {
    fn new() -> Self {
        AreaCache::default()
    }

    fn get(&self, name: &str) -> Option<i64> {
        self.by_name.get(name).copied()
    }

    fn insert(&mut self, name: &str, id: i64) {
        self.by_name.insert(name.to_string(), id);
        self.by_name.insert(normalize_text(name), id);
    }

    fn iter(&self) -> impl Iterator<Item = (&String, &i64)> {
        self.by_name.iter()
    }
}

/// Load a taxonomy table into a cache. `table` is one of the two internal
/// taxonomy table names, never user input.
async fn load_area_cache(pool: &PgPool, table: &str) -> Result<AreaCache> {
    let query = format!("SELECT id, name FROM {}", table);
    let rows: Vec<(i64, String)> = sqlx::query_as(&query)
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to load {}", table))?;

    let mut cache = AreaCache::new();
    for (id, name) in &rows {
        cache.insert(name, *id);
    }
    println!("Loaded {} entries from {}", rows.len(), table);
    Ok(cache)
}

/// Resolve a free-text general area to an expert_areas id. Never fails:
/// exact -> normalized -> containment (both directions) -> fallback keyword
/// table -> default id, warning on stderr when the last two tiers decide.
fn resolve_general_area(text: Option<&str>, cache: &AreaCache, rules: &ImportRules) -> i64 {
    let Some(raw) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return rules.default_area_id;
    };

    if let Some(id) = cache.get(raw) {
        return id;
    }
    if let Some(id) = cache.get(&normalize_text(raw)) {
        return id;
    }

    let lower = raw.to_lowercase();
    for (name, id) in cache.iter() {
        let name_lower = name.to_lowercase();
        if name_lower.contains(&lower) || lower.contains(&name_lower) {
            return *id;
        }
    }

    for rule in &rules.fallback_areas {
        if lower.contains(&rule.keyword) {
            eprintln!(
                "Warning: mapped area '{}' via fallback keyword '{}' (id {})",
                raw, rule.keyword, rule.area_id
            );
            return rule.area_id;
        }
    }

    eprintln!(
        "Warning: could not map area '{}', using default area id {}",
        raw, rules.default_area_id
    );
    rules.default_area_id
}

// =============================================================================
// Specialized-area tag splitting
// =============================================================================

/// Split a multi-valued specialized-area cell into canonical tags: split on
/// '/', apply the expansion table, dedupe preserving first-seen order, and
/// drop tags equal to or contained in the general-area text.
fn normalize_specialized_areas(
    areas_text: &str,
    general_area_text: Option<&str>,
    rules: &ImportRules,
) -> Vec<String> {
    let mut expanded: Vec<String> = Vec::new();
    for area in areas_text.split('/').map(str::trim).filter(|a| !a.is_empty()) {
        match rules.expansions.iter().find(|e| e.from == area) {
            Some(expansion) => expanded.extend(expansion.to.iter().cloned()),
            None => expanded.push(area.to_string()),
        }
    }

    let general_lower = general_area_text.unwrap_or("").trim().to_lowercase();
    let mut unique: Vec<String> = Vec::new();
    for area in expanded {
        if unique.contains(&area) {
            continue;
        }
        if !general_lower.is_empty() && general_lower.contains(&area.to_lowercase()) {
            continue;
        }
        unique.push(area);
    }
    unique
}

/// Map tags to specialized_areas ids, inserting unseen tags and growing the
/// cache immediately so later tags in the same run reuse them. In dry-run
/// mode unseen tags are reported instead of inserted.
async fn resolve_area_ids(
    pool: &PgPool,
    cache: &mut AreaCache,
    tags: &[String],
    dry_run: bool,
) -> Result<Vec<i64>> {
    let mut ids = Vec::with_capacity(tags.len());
    for tag in tags {
        if let Some(id) = cache.get(tag) {
            ids.push(id);
            continue;
        }

        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM specialized_areas WHERE name = $1")
                .bind(tag)
                .fetch_optional(pool)
                .await?;

        let id = match existing {
            Some((id,)) => id,
            None if dry_run => {
                println!("  Dry run - would create specialized area '{}'", tag);
                continue;
            }
            None => {
                let (id,): (i64,) =
                    sqlx::query_as("INSERT INTO specialized_areas (name) VALUES ($1) RETURNING id")
                        .bind(tag)
                        .fetch_one(pool)
                        .await?;
                id
            }
        };

        cache.insert(tag, id);
        ids.push(id);
    }
    Ok(ids)
}

// =============================================================================
// Field coercions
// =============================================================================

const AFFIRMATIVE_TOKENS: &[&str] = &["yes", "y", "true"];
const NEGATIVE_TOKENS: &[&str] = &["no", "n", "false"];

/// Storage policy for flag columns whose cell is absent or unrecognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AbsentFlags {
    /// Collapse absent/unrecognized values to false.
    False,
    /// Preserve absent/unrecognized values as NULL.
    Null,
}

fn parse_flag(value: Option<&str>, policy: AbsentFlags) -> Option<bool> {
    let token = value.map(|v| v.trim().to_lowercase()).unwrap_or_default();
    if AFFIRMATIVE_TOKENS.contains(&token.as_str()) {
        return Some(true);
    }
    match policy {
        AbsentFlags::False => Some(false),
        AbsentFlags::Null => {
            if NEGATIVE_TOKENS.contains(&token.as_str()) {
                Some(false)
            } else {
                None
            }
        }
    }
}

/// Extract the first run of digits from a source identity ("E012" -> 12).
fn extract_numeric_id(raw: &str) -> Option<i64> {
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

/// Designation fallback chain: explicit column -> Title -> the "." prefix
/// column -> honorific prefix on the name -> "Unknown".
fn resolve_designation(record: &RawRecord) -> String {
    if let Some(designation) = record.get("Designation") {
        return designation;
    }
    if let Some(title) = record.get("Title") {
        return title;
    }
    if let Some(prefix) = record.get(".") {
        return prefix;
    }
    let name = record.get_or("Name", "");
    let upper = name.to_uppercase();
    if upper.starts_with("DR.") {
        "Dr.".to_string()
    } else if upper.starts_with("PROF.") {
        "Prof.".to_string()
    } else {
        "Unknown".to_string()
    }
}

// =============================================================================
// Record transformation
// =============================================================================

/// A fully validated expert row ready for persistence. Every foreign key
/// references an existing taxonomy row by the time this exists.
#[derive(Debug, Clone)]
struct ExpertRow {
    id: i64,
    name: String,
    designation: String,
    affiliation: String,
    is_bahraini: Option<bool>,
    is_available: Option<bool>,
    rating: i32,
    role: String,
    employment_type: String,
    general_area: i64,
    specialized_area: String,
    is_trained: Option<bool>,
    cv_document_id: Option<i64>,
    phone: String,
    email: String,
    is_published: Option<bool>,
    approval_document_id: Option<i64>,
    original_request_id: Option<i64>,
    last_edited_by: i64,
}

/// Everything one import run needs: the storage handle, both taxonomy
/// caches, the resolution rules, the flag policy and the audit identity.
struct ImportContext {
    pool: PgPool,
    general_areas: AreaCache,
    specialized_areas: AreaCache,
    rules: ImportRules,
    absent_flags: AbsentFlags,
    system_user_id: i64,
    dry_run: bool,
}

/// Required text fields are coerced to the "Unknown" sentinel after all
/// defaulting, unconditionally and without per-field warnings.
fn apply_required_defaults(row: &mut ExpertRow) {
    for field in [
        &mut row.name,
        &mut row.designation,
        &mut row.affiliation,
        &mut row.role,
        &mut row.employment_type,
        &mut row.phone,
        &mut row.email,
    ] {
        if field.trim().is_empty() {
            *field = "Unknown".to_string();
        }
    }
}

/// Transform one raw CSV record into an ExpertRow. Returns None (with the
/// reason on stderr) when the record carries no extractable identity.
async fn transform_row(ctx: &mut ImportContext, record: &RawRecord) -> Result<Option<ExpertRow>> {
    let name = record.get_or("Name", "Unknown Expert");

    let Some(raw_id) = record.get("ID") else {
        eprintln!("Skipping '{}': missing ID", name);
        return Ok(None);
    };
    let Some(id) = extract_numeric_id(&raw_id) else {
        eprintln!("Skipping '{}': identity '{}' has no numeric part", name, raw_id);
        return Ok(None);
    };

    let general_area_text = record.get("General Area");
    let general_area =
        resolve_general_area(general_area_text.as_deref(), &ctx.general_areas, &ctx.rules);

    let tags = normalize_specialized_areas(
        &record.get_or("Specialised Area", ""),
        general_area_text.as_deref(),
        &ctx.rules,
    );
    let area_ids = resolve_area_ids(&ctx.pool, &mut ctx.specialized_areas, &tags, ctx.dry_run)
        .await?;
    let specialized_area = area_ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");

    let mut row = ExpertRow {
        id,
        name,
        designation: resolve_designation(record),
        affiliation: record.get_or("Institution", "Unknown"),
        is_bahraini: parse_flag(record.get("BH").as_deref(), ctx.absent_flags),
        is_available: parse_flag(record.get("Available").as_deref(), ctx.absent_flags),
        // Ratings are not imported from the sheet; every expert starts at 0.
        rating: 0,
        role: record.get_or("Validator/ Evaluator", "evaluator").to_lowercase(),
        employment_type: record.get_or("Academic/Employer", "Unknown"),
        general_area,
        specialized_area,
        is_trained: parse_flag(record.get("Trained").as_deref(), ctx.absent_flags),
        cv_document_id: None,
        phone: record.get_or("Phone", "00000000"),
        email: record.get_or("Email", "unknown@example.com"),
        is_published: parse_flag(record.get("Published").as_deref(), ctx.absent_flags),
        approval_document_id: None,
        original_request_id: None,
        last_edited_by: ctx.system_user_id,
    };
    apply_required_defaults(&mut row);
    Ok(Some(row))
}

// =============================================================================
// Batch loader
// =============================================================================

const INSERT_EXPERT_SQL: &str = r#"
    INSERT INTO experts (
        id, name, designation, affiliation, is_bahraini,
        is_available, rating, role, employment_type, general_area,
        specialized_area, is_trained, cv_document_id, phone, email, is_published,
        approval_document_id, original_request_id, last_edited_by, last_edited_at
    ) VALUES (
        $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
        $11, $12, $13, $14, $15, $16, $17, $18, $19, CURRENT_TIMESTAMP
    )
    ON CONFLICT (id) DO UPDATE SET
        name = EXCLUDED.name,
        designation = EXCLUDED.designation,
        affiliation = EXCLUDED.affiliation,
        is_bahraini = EXCLUDED.is_bahraini,
        is_available = EXCLUDED.is_available,
        rating = EXCLUDED.rating,
        role = EXCLUDED.role,
        employment_type = EXCLUDED.employment_type,
        general_area = EXCLUDED.general_area,
        specialized_area = EXCLUDED.specialized_area,
        is_trained = EXCLUDED.is_trained,
        cv_document_id = EXCLUDED.cv_document_id,
        phone = EXCLUDED.phone,
        email = EXCLUDED.email,
        is_published = EXCLUDED.is_published,
        approval_document_id = EXCLUDED.approval_document_id,
        original_request_id = EXCLUDED.original_request_id,
        last_edited_by = EXCLUDED.last_edited_by,
        last_edited_at = CURRENT_TIMESTAMP
"#;

/// Buffers transformed rows and applies them in fixed-size transactional
/// batches. A failed batch is rolled back whole, every buffered record is
/// counted as failed, and the run continues.
struct BatchLoader {
    batch_size: usize,
    buffer: Vec<ExpertRow>,
    applied: usize,
    failed: usize,
    errors: Vec<String>,
    dry_run: bool,
}

impl BatchLoader {
    fn new(batch_size: usize, dry_run: bool) -> Self {
        BatchLoader {
            batch_size: batch_size.max(1),
            buffer: Vec::new(),
            applied: 0,
            failed: 0,
            errors: Vec::new(),
            dry_run,
        }
    }

    async fn push(&mut self, pool: &PgPool, row: ExpertRow) {
        self.buffer.push(row);
        if self.buffer.len() >= self.batch_size {
            self.flush(pool).await;
        }
    }

    async fn flush(&mut self, pool: &PgPool) {
        if self.buffer.is_empty() {
            return;
        }
        if self.dry_run {
            println!("Dry run - skipping batch of {} records", self.buffer.len());
            self.applied += self.buffer.len();
            self.buffer.clear();
            return;
        }

        match self.write_batch(pool).await {
            Ok(count) => {
                self.applied += count;
                println!(
                    "Imported batch of {} records (total applied: {})",
                    count, self.applied
                );
            }
            Err(e) => {
                eprintln!("Error applying batch: {}", e);
                for row in &self.buffer {
                    self.errors.push(format!(
                        "Expert {} ({}): batch rolled back: {}",
                        row.id, row.name, e
                    ));
                }
                self.failed += self.buffer.len();
            }
        }
        self.buffer.clear();
    }

    async fn write_batch(&self, pool: &PgPool) -> Result<usize> {
        let mut tx = pool.begin().await?;
        for row in &self.buffer {
            sqlx::query(INSERT_EXPERT_SQL)
                .bind(row.id)
                .bind(&row.name)
                .bind(&row.designation)
                .bind(&row.affiliation)
                .bind(row.is_bahraini)
                .bind(row.is_available)
                .bind(row.rating)
                .bind(&row.role)
                .bind(&row.employment_type)
                .bind(row.general_area)
                .bind(&row.specialized_area)
                .bind(row.is_trained)
                .bind(row.cv_document_id)
                .bind(&row.phone)
                .bind(&row.email)
                .bind(row.is_published)
                .bind(row.approval_document_id)
                .bind(row.original_request_id)
                .bind(row.last_edited_by)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(self.buffer.len())
    }
}

// =============================================================================
// Storage helpers
// =============================================================================

/// Get or create the SYSTEM user whose id stamps imported records. In a
/// dry run a missing SYSTEM user is reported, not created.
async fn get_or_create_system_user(pool: &PgPool, dry_run: bool) -> Result<i64> {
    let existing: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM users WHERE name = $1 AND email = $2")
            .bind(SYSTEM_USER_NAME)
            .bind(SYSTEM_USER_EMAIL)
            .fetch_optional(pool)
            .await?;

    if let Some((id,)) = existing {
        println!("Found existing SYSTEM user (id {})", id);
        return Ok(id);
    }
    if dry_run {
        println!("Dry run - SYSTEM user would be created");
        return Ok(0);
    }

    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO users (name, email, password_hash, role, is_active) \
         VALUES ($1, $2, $3, $4, FALSE) RETURNING id",
    )
    .bind(SYSTEM_USER_NAME)
    .bind(SYSTEM_USER_EMAIL)
    .bind("SYSTEM-USER-NO-LOGIN")
    .bind("system")
    .fetch_one(pool)
    .await?;

    println!("Created SYSTEM user (id {}) for the audit trail", id);
    Ok(id)
}

/// Move the experts id sequence past the highest imported id so
/// interactively created experts do not collide with imported ones.
async fn reset_expert_sequence(pool: &PgPool) -> Result<()> {
    let (max_id,): (Option<i64>,) = sqlx::query_as("SELECT MAX(id) FROM experts")
        .fetch_one(pool)
        .await?;
    let max_id = max_id.unwrap_or(0);
    sqlx::query("SELECT setval('experts_id_seq', GREATEST($1, 1))")
        .bind(max_id)
        .execute(pool)
        .await?;
    println!("Reset expert id sequence to {}", max_id);
    Ok(())
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

/// Close out an import_runs row with its final status and counts.
async fn finish_import_run(
    pool: &PgPool,
    run_id: Uuid,
    status: &str,
    error: Option<&str>,
    applied: usize,
    failed: usize,
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
    .bind(serde_json::json!({ "applied": applied, "failed": failed }))
    .execute(pool)
    .await?;
    Ok(())
}

/// Overwrite the error log side file with one line per failed record.
async fn write_error_log(path: &str, title: &str, errors: &[String]) -> Result<()> {
    let mut out = String::new();
    out.push_str(title);
    out.push('\n');
    out.push_str(&"=".repeat(title.len()));
    out.push_str("\n\n");
    for error in errors {
        out.push_str(error);
        out.push('\n');
    }
    fs::write(path, out)
        .await
        .with_context(|| format!("Failed to write error log '{}'", path))?;
    Ok(())
}

// =============================================================================
// CSV import pipeline
// =============================================================================

struct RunSummary {
    offered: usize,
    applied: usize,
    failed: usize,
    errors: Vec<String>,
}

async fn run_expert_import(pool: &PgPool, args: &Args, rules: ImportRules) -> Result<RunSummary> {
    let system_user_id = get_or_create_system_user(pool, args.dry_run).await?;

    let mut ctx = ImportContext {
        pool: pool.clone(),
        general_areas: load_area_cache(pool, "expert_areas").await?,
        specialized_areas: load_area_cache(pool, "specialized_areas").await?,
        rules,
        absent_flags: args.absent_flags,
        system_user_id,
        dry_run: args.dry_run,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(&args.csv)
        .with_context(|| format!("Failed to open CSV file '{}'", args.csv))?;

    let headers = reader
        .headers()
        .context("Failed to read CSV header row")?
        .clone();
    let cleaned: Vec<&str> = headers.iter().map(clean_key).collect();
    println!("CSV headers (cleaned): {:?}", cleaned);

    let mut loader = BatchLoader::new(args.batch_size, args.dry_run);
    let mut offered = 0usize;
    let mut transform_failed = 0usize;
    let mut errors: Vec<String> = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        if args.test && offered >= TEST_LIMIT {
            println!("Test mode: stopping after {} records", TEST_LIMIT);
            break;
        }
        offered += 1;
        let row_num = idx + 2; // 1-indexed plus the header row

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                eprintln!("Row {}: CSV parse error: {}", row_num, e);
                errors.push(format!("Row {}: CSV parse error: {}", row_num, e));
                transform_failed += 1;
                continue;
            }
        };

        let raw = RawRecord::from_csv(&headers, &record);
        match transform_row(&mut ctx, &raw).await {
            Ok(Some(row)) => loader.push(pool, row).await,
            Ok(None) => {
                errors.push(format!("Row {}: missing or invalid identity", row_num));
                transform_failed += 1;
            }
            Err(e) => {
                eprintln!("Row {}: transform failed: {}", row_num, e);
                errors.push(format!("Row {}: transform failed: {}", row_num, e));
                transform_failed += 1;
            }
        }
    }

    loader.flush(pool).await;

    if !args.dry_run {
        reset_expert_sequence(pool).await?;
    }

    errors.extend(loader.errors);
    Ok(RunSummary {
        offered,
        applied: loader.applied,
        failed: transform_failed + loader.failed,
        errors,
    })
}

// =============================================================================
// CV document import mode
// =============================================================================

/// Matches the fixed CV filename shape ID####.pdf (case-insensitive) and
/// extracts the embedded expert id.
fn match_cv_filename(name: &str) -> Option<i64> {
    let lower = name.to_lowercase();
    let digits = lower.strip_prefix("id")?.strip_suffix(".pdf")?;
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

async fn run_cv_import(pool: &PgPool, args: &Args) -> Result<RunSummary> {
    let cv_dir = Path::new(&args.cv_dir);
    fs::create_dir_all(cv_dir)
        .await
        .with_context(|| format!("Failed to create CV directory '{}'", args.cv_dir))?;

    let mut files: Vec<(i64, String, std::path::PathBuf)> = Vec::new();
    let mut dir = fs::read_dir(cv_dir)
        .await
        .with_context(|| format!("Failed to read CV directory '{}'", args.cv_dir))?;
    while let Some(entry) = dir.next_entry().await? {
        let file_name = entry.file_name().to_string_lossy().to_string();
        if let Some(expert_id) = match_cv_filename(&file_name) {
            files.push((expert_id, file_name, entry.path()));
        }
    }
    files.sort_by_key(|(id, _, _)| *id);

    if files.is_empty() {
        println!("No CV files matching ID####.pdf found in {}", args.cv_dir);
        return Ok(RunSummary {
            offered: 0,
            applied: 0,
            failed: 0,
            errors: Vec::new(),
        });
    }
    println!("Found {} CV files to process", files.len());

    let mut applied = 0usize;
    let mut failed = 0usize;
    let mut errors: Vec<String> = Vec::new();

    for (expert_id, filename, path) in &files {
        if args.test && applied + failed >= TEST_LIMIT {
            println!("Test mode: stopping after {} CV files", TEST_LIMIT);
            break;
        }

        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM experts WHERE id = $1")
            .bind(*expert_id)
            .fetch_optional(pool)
            .await?;
        if exists.is_none() {
            let msg = format!("Expert {} not found for file {}", expert_id, filename);
            eprintln!("{}", msg);
            errors.push(msg);
            failed += 1;
            continue;
        }

        let has_cv: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM expert_documents WHERE expert_id = $1 AND document_type = 'cv'",
        )
        .bind(*expert_id)
        .fetch_optional(pool)
        .await?;
        if has_cv.is_some() {
            println!(
                "CV already registered for expert {}, skipping {}",
                expert_id, filename
            );
            continue;
        }

        let size = fs::metadata(path).await?.len() as i64;

        if args.dry_run {
            println!(
                "Dry run - would register CV for expert {}: {} ({} bytes)",
                expert_id, filename, size
            );
            applied += 1;
            continue;
        }

        let insert = sqlx::query(
            "INSERT INTO expert_documents \
             (expert_id, document_type, filename, file_path, content_type, file_size) \
             VALUES ($1, 'cv', $2, $3, 'application/pdf', $4)",
        )
        .bind(*expert_id)
        .bind(filename)
        .bind(path.to_string_lossy().to_string())
        .bind(size)
        .execute(pool)
        .await;

        match insert {
            Ok(_) => {
                applied += 1;
                println!(
                    "Registered CV for expert {}: {} ({} bytes)",
                    expert_id, filename, size
                );
            }
            Err(e) => {
                let msg = format!("Error registering {}: {}", filename, e);
                eprintln!("{}", msg);
                errors.push(msg);
                failed += 1;
            }
        }
    }

    Ok(RunSummary {
        offered: applied + failed,
        applied,
        failed,
        errors,
    })
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let db_url = std::env::var("DB_URL").context("DB_URL env var missing")?;

    println!("=== Expert Registry Importer ===");
    println!("Mode: {}", if args.cvs { "cv-import" } else { "csv-import" });
    if args.dry_run {
        println!("Dry run - nothing will be saved");
    }
    if args.test {
        println!("Test mode: only the first {} records will be processed", TEST_LIMIT);
    }

    if !args.cvs && !Path::new(&args.csv).exists() {
        anyhow::bail!("CSV file '{}' not found", args.csv);
    }

    let rules = match &args.rules {
        Some(path) => {
            println!("Loading rules from: {}", path);
            load_rules(path).await?
        }
        None => ImportRules::default(),
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await
        .context("Failed to connect to database")?;

    let component = if args.cvs { "cv-import" } else { "importer" };
    let run_id = if !args.dry_run {
        Some(create_import_run(&pool, component).await?)
    } else {
        None
    };

    let result = if args.cvs {
        run_cv_import(&pool, &args).await
    } else {
        run_expert_import(&pool, &args, rules).await
    };

    if let Some(run_id) = run_id {
        match &result {
            Ok(summary) => {
                let status = if summary.failed == 0 { "ok" } else { "partial" };
                finish_import_run(&pool, run_id, status, None, summary.applied, summary.failed)
                    .await?;
            }
            Err(e) => {
                finish_import_run(&pool, run_id, "failed", Some(&e.to_string()), 0, 0).await?;
            }
        }
    }

    let summary = result?;

    println!("\n=== Import Summary ===");
    println!("Rows offered: {}", summary.offered);
    println!("Records applied: {}", summary.applied);
    println!("Records failed: {}", summary.failed);

    if !args.cvs && !args.dry_run {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM experts")
            .fetch_one(&pool)
            .await?;
        println!("Total experts in database: {}", total);
    }

    if !summary.errors.is_empty() {
        let (path, title) = if args.cvs {
            (CV_ERROR_LOG_PATH, "CV Import Error Log")
        } else {
            (ERROR_LOG_PATH, "Import Error Log")
        };
        write_error_log(path, title, &summary.errors).await?;
        println!("Error log written to: {}", path);
    }

    if summary.failed > 0 {
        println!(
            "Import completed with {} errors out of {} rows",
            summary.failed, summary.offered
        );
        pool.close().await;
        std::process::exit(2);
    }

    println!("All records processed successfully");
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[(Option<&str>, Option<&str>)]) -> RawRecord {
        RawRecord {
            fields: fields
                .iter()
                .map(|(k, v)| (k.map(String::from), v.map(String::from)))
                .collect(),
        }
    }

    fn cache_of(entries: &[(&str, i64)]) -> AreaCache {
        let mut cache = AreaCache::new();
        for (name, id) in entries {
            cache.insert(name, *id);
        }
        cache
    }

    // -------------------------------------------------------------------------
    // TEXT NORMALIZER
    // -------------------------------------------------------------------------

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize_text("Science   -Mathematics"), "Science - Mathematics");
        assert_eq!(normalize_text("  Business  Administration "), "Business Administration");
    }

    #[test]
    fn test_normalize_hyphen_padding() {
        assert_eq!(normalize_text("Science-Mathematics"), "Science - Mathematics");
        assert_eq!(normalize_text("Science - Mathematics"), "Science - Mathematics");
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn test_normalize_idempotent() {
        for input in ["Science-Mathematics", "a  b   c", "x--y", " - ", "plain text"] {
            let once = normalize_text(input);
            assert_eq!(normalize_text(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_normalize_never_leaves_double_spaces() {
        for input in ["a  b", "a - b", "a--b", "  a   -   b  "] {
            assert!(!normalize_text(input).contains("  "), "double space for {:?}", input);
        }
    }

    // -------------------------------------------------------------------------
    // FIELD ACCESSOR
    // -------------------------------------------------------------------------

    #[test]
    fn test_accessor_exact_case_insensitive() {
        let r = record(&[(Some("Name"), Some("Alice"))]);
        assert_eq!(r.get("name"), Some("Alice".to_string()));
        assert_eq!(r.get("NAME"), Some("Alice".to_string()));
    }

    #[test]
    fn test_accessor_strips_bom_and_whitespace() {
        let r = record(&[(Some("\u{feff} ID "), Some("E007"))]);
        assert_eq!(r.get("ID"), Some("E007".to_string()));
    }

    #[test]
    fn test_accessor_substring_pass() {
        let r = record(&[(Some("Specialised Area (multiple)"), Some("Banking"))]);
        assert_eq!(r.get("Specialised Area"), Some("Banking".to_string()));
    }

    #[test]
    fn test_accessor_exact_wins_over_substring() {
        let r = record(&[
            (Some("General Area Notes"), Some("wrong")),
            (Some("General Area"), Some("right")),
        ]);
        assert_eq!(r.get("General Area"), Some("right".to_string()));
    }

    #[test]
    fn test_accessor_skips_null_keys() {
        let r = record(&[(None, Some("orphan")), (Some("Name"), Some("Bob"))]);
        assert_eq!(r.get("Name"), Some("Bob".to_string()));
        assert_eq!(r.get("orphan"), None);
    }

    #[test]
    fn test_accessor_empty_value_yields_default() {
        let r = record(&[(Some("Phone"), Some("   "))]);
        assert_eq!(r.get("Phone"), None);
        assert_eq!(r.get_or("Phone", "00000000"), "00000000");
    }

    #[test]
    fn test_accessor_missing_key_yields_default() {
        let r = record(&[(Some("Name"), Some("Alice"))]);
        assert_eq!(r.get_or("Email", "unknown@example.com"), "unknown@example.com");
    }

    // -------------------------------------------------------------------------
    // TAXONOMY RESOLVER
    // -------------------------------------------------------------------------

    #[test]
    fn test_resolve_exact_match() {
        let cache = cache_of(&[("Business", 1), ("Engineering", 14)]);
        let rules = ImportRules::default();
        assert_eq!(resolve_general_area(Some("Engineering"), &cache, &rules), 14);
    }

    #[test]
    fn test_resolve_normalized_match() {
        let cache = cache_of(&[("Science - Mathematics", 26)]);
        let rules = ImportRules::default();
        assert_eq!(resolve_general_area(Some("Science-Mathematics"), &cache, &rules), 26);
    }

    #[test]
    fn test_resolve_containment_match() {
        let cache = cache_of(&[("Information Technology", 25)]);
        let rules = ImportRules::default();
        // Short alias contained in a taxonomy name resolves to it.
        assert_eq!(resolve_general_area(Some("IT"), &cache, &rules), 25);
        // And the reverse direction: input containing a taxonomy name.
        assert_eq!(
            resolve_general_area(Some("Applied Information Technology Studies"), &cache, &rules),
            25
        );
    }

    #[test]
    fn test_resolve_fallback_keyword() {
        let cache = AreaCache::new();
        let rules = ImportRules::default();
        assert_eq!(resolve_general_area(Some("IT"), &cache, &rules), 25);
        assert_eq!(resolve_general_area(Some("Aviation Management"), &cache, &rules), 44);
    }

    #[test]
    fn test_resolve_default_for_unknown() {
        let cache = cache_of(&[("Business", 1)]);
        let rules = ImportRules::default();
        assert_eq!(resolve_general_area(Some("Zoology"), &cache, &rules), rules.default_area_id);
    }

    #[test]
    fn test_resolve_empty_and_missing_use_default() {
        let cache = cache_of(&[("Business", 1)]);
        let rules = ImportRules::default();
        assert_eq!(resolve_general_area(None, &cache, &rules), rules.default_area_id);
        assert_eq!(resolve_general_area(Some("   "), &cache, &rules), rules.default_area_id);
    }

    #[test]
    fn test_resolve_always_returns_known_id() {
        let cache = cache_of(&[("Business", 1), ("Engineering", 14), ("Law", 39)]);
        let rules = ImportRules::default();
        let mut valid: Vec<i64> = cache.iter().map(|(_, id)| *id).collect();
        valid.push(rules.default_area_id);
        valid.extend(rules.fallback_areas.iter().map(|f| f.area_id));
        for input in [Some("Engineering"), Some("eng"), Some("Zoology"), Some("law firm"), None] {
            let id = resolve_general_area(input, &cache, &rules);
            assert!(valid.contains(&id), "unexpected id {} for {:?}", id, input);
        }
    }

    // -------------------------------------------------------------------------
    // TAG SPLITTER
    // -------------------------------------------------------------------------

    #[test]
    fn test_split_empty_input() {
        let rules = ImportRules::default();
        assert!(normalize_specialized_areas("", None, &rules).is_empty());
        assert!(normalize_specialized_areas("  ", Some("Finance"), &rules).is_empty());
    }

    #[test]
    fn test_split_on_slash() {
        let rules = ImportRules::default();
        let tags = normalize_specialized_areas("Banking / Insurance", None, &rules);
        assert_eq!(tags, vec!["Banking", "Insurance"]);
    }

    #[test]
    fn test_split_expansion_then_parent_exclusion() {
        let rules = ImportRules::default();
        // "Banking and Finance" expands to two tags; "Finance" is then
        // dropped as redundant with the general area.
        let tags = normalize_specialized_areas("Banking and Finance", Some("Finance"), &rules);
        assert_eq!(tags, vec!["Banking"]);
    }

    #[test]
    fn test_split_single_target_expansion() {
        let rules = ImportRules::default();
        let tags = normalize_specialized_areas("IT", None, &rules);
        assert_eq!(tags, vec!["Information Technology"]);
    }

    #[test]
    fn test_split_deduplicates_preserving_order() {
        let rules = ImportRules::default();
        let tags = normalize_specialized_areas(
            "Marketing and Management / Management / Marketing",
            None,
            &rules,
        );
        assert_eq!(tags, vec!["Marketing", "Management"]);
    }

    #[test]
    fn test_split_drops_tag_contained_in_parent() {
        let rules = ImportRules::default();
        let tags =
            normalize_specialized_areas("Engineering / Robotics", Some("Civil Engineering"), &rules);
        assert_eq!(tags, vec!["Robotics"]);
    }

    #[test]
    fn test_split_never_returns_parent_itself() {
        let rules = ImportRules::default();
        for parent in ["Finance", "finance", "FINANCE"] {
            let tags = normalize_specialized_areas("Finance / Banking", Some(parent), &rules);
            assert_eq!(tags, vec!["Banking"]);
        }
    }

    // -------------------------------------------------------------------------
    // FLAG COERCION
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_flag_affirmative_tokens() {
        for token in ["Yes", "yes", "Y", "y", "TRUE", "true", " yes "] {
            assert_eq!(parse_flag(Some(token), AbsentFlags::False), Some(true));
            assert_eq!(parse_flag(Some(token), AbsentFlags::Null), Some(true));
        }
    }

    #[test]
    fn test_parse_flag_collapse_policy() {
        assert_eq!(parse_flag(Some("No"), AbsentFlags::False), Some(false));
        assert_eq!(parse_flag(Some("maybe"), AbsentFlags::False), Some(false));
        assert_eq!(parse_flag(None, AbsentFlags::False), Some(false));
    }

    #[test]
    fn test_parse_flag_null_policy() {
        assert_eq!(parse_flag(Some("No"), AbsentFlags::Null), Some(false));
        assert_eq!(parse_flag(Some("n"), AbsentFlags::Null), Some(false));
        assert_eq!(parse_flag(Some("maybe"), AbsentFlags::Null), None);
        assert_eq!(parse_flag(None, AbsentFlags::Null), None);
    }

    // -------------------------------------------------------------------------
    // IDENTITY EXTRACTION
    // -------------------------------------------------------------------------

    #[test]
    fn test_extract_numeric_id_prefixed() {
        assert_eq!(extract_numeric_id("E007"), Some(7));
        assert_eq!(extract_numeric_id("E012"), Some(12));
        assert_eq!(extract_numeric_id("ID-341"), Some(341));
    }

    #[test]
    fn test_extract_numeric_id_bare_digits() {
        assert_eq!(extract_numeric_id("12"), Some(12));
    }

    #[test]
    fn test_extract_numeric_id_first_run_wins() {
        assert_eq!(extract_numeric_id("E12X99"), Some(12));
    }

    #[test]
    fn test_extract_numeric_id_rejects_no_digits() {
        assert_eq!(extract_numeric_id("UNKNOWN"), None);
        assert_eq!(extract_numeric_id(""), None);
        assert_eq!(extract_numeric_id("E"), None);
    }

    // -------------------------------------------------------------------------
    // DESIGNATION CHAIN
    // -------------------------------------------------------------------------

    #[test]
    fn test_designation_explicit_column() {
        let r = record(&[
            (Some("Designation"), Some("Senior Lecturer")),
            (Some("Name"), Some("Dr. Alice")),
        ]);
        assert_eq!(resolve_designation(&r), "Senior Lecturer");
    }

    #[test]
    fn test_designation_title_fallback() {
        let r = record(&[(Some("Title"), Some("Professor")), (Some("Name"), Some("Bob"))]);
        assert_eq!(resolve_designation(&r), "Professor");
    }

    #[test]
    fn test_designation_name_prefix_fallback() {
        let dr = record(&[(Some("Name"), Some("Dr. Alice"))]);
        assert_eq!(resolve_designation(&dr), "Dr.");
        let prof = record(&[(Some("Name"), Some("PROF. Bob"))]);
        assert_eq!(resolve_designation(&prof), "Prof.");
    }

    #[test]
    fn test_designation_unknown_fallback() {
        let r = record(&[(Some("Name"), Some("Alice"))]);
        assert_eq!(resolve_designation(&r), "Unknown");
    }

    // -------------------------------------------------------------------------
    // REQUIRED-FIELD DEFAULTING
    // -------------------------------------------------------------------------

    #[test]
    fn test_required_defaults_coerce_empty_to_unknown() {
        let mut row = ExpertRow {
            id: 1,
            name: "".to_string(),
            designation: "  ".to_string(),
            affiliation: "Acme".to_string(),
            is_bahraini: Some(true),
            is_available: Some(false),
            rating: 0,
            role: "evaluator".to_string(),
            employment_type: "".to_string(),
            general_area: 1,
            specialized_area: String::new(),
            is_trained: None,
            cv_document_id: None,
            phone: "00000000".to_string(),
            email: "unknown@example.com".to_string(),
            is_published: None,
            approval_document_id: None,
            original_request_id: None,
            last_edited_by: 1,
        };
        apply_required_defaults(&mut row);
        assert_eq!(row.name, "Unknown");
        assert_eq!(row.designation, "Unknown");
        assert_eq!(row.employment_type, "Unknown");
        assert_eq!(row.affiliation, "Acme");
    }

    // -------------------------------------------------------------------------
    // CV FILENAME MATCHING
    // -------------------------------------------------------------------------

    #[test]
    fn test_cv_filename_matches() {
        assert_eq!(match_cv_filename("ID0001.pdf"), Some(1));
        assert_eq!(match_cv_filename("ID0042.pdf"), Some(42));
        assert_eq!(match_cv_filename("id1234.PDF"), Some(1234));
    }

    #[test]
    fn test_cv_filename_rejects_wrong_shapes() {
        assert_eq!(match_cv_filename("ID001.pdf"), None);
        assert_eq!(match_cv_filename("ID00001.pdf"), None);
        assert_eq!(match_cv_filename("ID0001.docx"), None);
        assert_eq!(match_cv_filename("CV0001.pdf"), None);
        assert_eq!(match_cv_filename("ID00a1.pdf"), None);
    }

    // -------------------------------------------------------------------------
    // RULES CONFIGURATION
    // -------------------------------------------------------------------------

    #[test]
    fn test_default_rules_fallback_ordering() {
        let rules = ImportRules::default();
        let it_pos = rules
            .fallback_areas
            .iter()
            .position(|f| f.keyword == "it")
            .unwrap();
        let full_pos = rules
            .fallback_areas
            .iter()
            .position(|f| f.keyword == "information technology")
            .unwrap();
        assert!(full_pos < it_pos);
    }

    #[test]
    fn test_rules_parse_from_json() {
        let json = r#"{
            "default_area_id": 9,
            "fallback_areas": [{"keyword": "Law", "area_id": 3}],
            "expansions": [{"from": "QA", "to": ["Quality Assurance"]}]
        }"#;
        let rules: ImportRules = serde_json::from_str(json).unwrap();
        assert_eq!(rules.default_area_id, 9);
        assert_eq!(rules.fallback_areas.len(), 1);
        assert_eq!(rules.expansions[0].to, vec!["Quality Assurance"]);
    }

    // -------------------------------------------------------------------------
    // AREA CACHE
    // -------------------------------------------------------------------------

    #[test]
    fn test_cache_keys_raw_and_normalized() {
        let cache = cache_of(&[("Science - Mathematics", 26)]);
        assert_eq!(cache.get("Science - Mathematics"), Some(26));
        assert_eq!(cache.get(&normalize_text("Science-Mathematics")), Some(26));
    }

    #[test]
    fn test_cache_insert_is_visible_immediately() {
        let mut cache = AreaCache::new();
        assert_eq!(cache.get("Robotics"), None);
        cache.insert("Robotics", 7);
        assert_eq!(cache.get("Robotics"), Some(7));
    }
}
