//! AI Placeholder Service - Synthetic stand-in for the future AI backend
//!
//! Endpoints:
//! - GET  /                 - Service info
//! - POST /generate-profile - Synthetic profile paragraph
//! - POST /suggest-isced    - Keyword-based ISCED field suggestion
//! - POST /extract-skills   - Synthetic skill list
//!
//! Everything returned here is synthetic. Responses are deterministic per
//! input so the surrounding tooling can be tested against stable output.

use axum::{
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ProfileRequest {
    name: Option<String>,
    designation: Option<String>,
    institution: Option<String>,
    general_area: Option<String>,
}

#[derive(Serialize)]
struct ProfileResponse {
    result: String,
    confidence_score: f64,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct SuggestIscedRequest {
    general_area: Option<String>,
    specialized_area: Option<String>,
}

#[derive(Serialize)]
struct IscedSuggestion {
    broad_code: String,
    broad_name: String,
    confidence: f64,
}

#[derive(Serialize)]
struct SuggestIscedResponse {
    result: IscedSuggestion,
    confidence_score: f64,
}

#[derive(Serialize)]
struct ExtractSkillsResponse {
    result: Vec<String>,
    confidence_score: f64,
}

// ============================================================================
// Synthetic content
// ============================================================================

/// Keyword -> ISCED broad field, matched by containment in the lowercased
/// input. Order matters: earlier keywords win.
const ISCED_KEYWORDS: &[(&str, &str, &str)] = &[
    ("computer", "06", "Information and Communication Technologies"),
    ("software", "06", "Information and Communication Technologies"),
    ("it", "06", "Information and Communication Technologies"),
    ("programming", "06", "Information and Communication Technologies"),
    ("engineering", "07", "Engineering, manufacturing and construction"),
    ("manufacturing", "07", "Engineering, manufacturing and construction"),
    ("construction", "07", "Engineering, manufacturing and construction"),
    ("business", "04", "Business, administration and law"),
    ("management", "04", "Business, administration and law"),
    ("law", "04", "Business, administration and law"),
    ("finance", "04", "Business, administration and law"),
    ("science", "05", "Natural sciences, mathematics and statistics"),
    ("mathematics", "05", "Natural sciences, mathematics and statistics"),
    ("physics", "05", "Natural sciences, mathematics and statistics"),
    ("chemistry", "05", "Natural sciences, mathematics and statistics"),
    ("biology", "05", "Natural sciences, mathematics and statistics"),
    ("education", "01", "Education"),
    ("teaching", "01", "Education"),
    ("art", "02", "Arts and humanities"),
    ("design", "02", "Arts and humanities"),
    ("humanities", "02", "Arts and humanities"),
    ("language", "02", "Arts and humanities"),
    ("health", "09", "Health and welfare"),
    ("medicine", "09", "Health and welfare"),
    ("nursing", "09", "Health and welfare"),
    ("welfare", "09", "Health and welfare"),
];

const DEFAULT_ISCED_CODE: &str = "00";
const DEFAULT_ISCED_NAME: &str = "Generic programmes and qualifications";

const COMMON_SKILLS: &[&str] = &[
    "Communication",
    "Leadership",
    "Project Management",
    "Problem Solving",
    "Team Collaboration",
    "Critical Thinking",
    "Time Management",
];

const TECH_SKILLS: &[&str] = &[
    "Python",
    "JavaScript",
    "SQL",
    "Data Analysis",
    "Machine Learning",
    "Cloud Computing",
    "RESTful APIs",
    "Docker",
    "Kubernetes",
    "DevOps",
    "React",
    "Node.js",
    "Go",
    "Java",
    "C++",
    "CI/CD",
];

const DOMAIN_SKILLS: &[&str] = &[
    "Financial Analysis",
    "Market Research",
    "Product Development",
    "Quality Assurance",
    "Regulatory Compliance",
    "Digital Marketing",
    "Customer Relationship Management",
    "Supply Chain Management",
];

fn fnv1a(seed: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in seed.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Deterministic stand-in for a model confidence: hashes the input into the
/// requested range so repeated calls agree.
fn synthetic_confidence(seed: &str, lo: f64, hi: f64) -> f64 {
    lo + (fnv1a(seed) % 1000) as f64 / 1000.0 * (hi - lo)
}

fn pick_skills(pool: &[&str], seed: &str, salt: &str, count: usize) -> Vec<String> {
    let offset = (fnv1a(&format!("{}:{}", seed, salt)) as usize) % pool.len();
    (0..count.min(pool.len()))
        .map(|i| pool[(offset + i) % pool.len()].to_string())
        .collect()
}

fn suggest_isced(general_area: &str, specialized_area: &str) -> IscedSuggestion {
    let general = general_area.to_lowercase();
    let specialized = specialized_area.to_lowercase();

    let mut code = DEFAULT_ISCED_CODE;
    let mut name = DEFAULT_ISCED_NAME;
    let mut confidence = 0.5;

    for (keyword, c, n) in ISCED_KEYWORDS {
        if !general.is_empty() && general.contains(keyword) {
            code = c;
            name = n;
            confidence = synthetic_confidence(&general, 0.7, 0.9);
            break;
        }
    }

    // The specialized area is the stronger signal and may override.
    for (keyword, c, n) in ISCED_KEYWORDS {
        if !specialized.is_empty() && specialized.contains(keyword) {
            code = c;
            name = n;
            confidence = synthetic_confidence(&specialized, 0.85, 0.98);
            break;
        }
    }

    IscedSuggestion {
        broad_code: code.to_string(),
        broad_name: name.to_string(),
        confidence,
    }
}

fn synthetic_profile(req: &ProfileRequest) -> String {
    let name = req.name.as_deref().unwrap_or("Expert");
    let designation = req.designation.as_deref().unwrap_or("Professional");
    let institution = req.institution.as_deref().unwrap_or("Organization");
    let general_area = req.general_area.as_deref().unwrap_or("Expertise");

    format!(
        "{} is a highly qualified {} at {} with extensive experience in {}. \
         They have contributed to numerous projects and have demonstrated exceptional \
         skills in problem-solving and collaboration. Their expertise in {} has been \
         recognized through various professional achievements.",
        name, designation, institution, general_area, general_area
    )
}

fn synthetic_skills(seed: &str) -> Vec<String> {
    let hash = fnv1a(seed);
    let num_common = 2 + (hash % 3) as usize; // 2..=4
    let num_tech = 3 + ((hash >> 8) % 4) as usize; // 3..=6
    let num_domain = 2 + ((hash >> 16) % 2) as usize; // 2..=3

    let mut skills = pick_skills(COMMON_SKILLS, seed, "common", num_common);
    skills.extend(pick_skills(TECH_SKILLS, seed, "tech", num_tech));
    skills.extend(pick_skills(DOMAIN_SKILLS, seed, "domain", num_domain));
    skills
}

// ============================================================================
// Handlers
// ============================================================================

async fn info_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "Expert Registry AI Service Placeholder",
        "status": "running",
        "endpoints": [
            "/generate-profile",
            "/suggest-isced",
            "/extract-skills"
        ]
    }))
}

async fn generate_profile_handler(Json(req): Json<ProfileRequest>) -> Json<ProfileResponse> {
    let result = synthetic_profile(&req);
    let confidence_score = synthetic_confidence(&result, 0.85, 0.98);
    Json(ProfileResponse {
        result,
        confidence_score,
    })
}

async fn suggest_isced_handler(Json(req): Json<SuggestIscedRequest>) -> Json<SuggestIscedResponse> {
    let suggestion = suggest_isced(
        req.general_area.as_deref().unwrap_or(""),
        req.specialized_area.as_deref().unwrap_or(""),
    );
    let confidence_score = suggestion.confidence;
    Json(SuggestIscedResponse {
        result: suggestion,
        confidence_score,
    })
}

async fn extract_skills_handler(Json(payload): Json<serde_json::Value>) -> Json<ExtractSkillsResponse> {
    let seed = payload.to_string();
    let result = synthetic_skills(&seed);
    let confidence_score = synthetic_confidence(&seed, 0.75, 0.95);
    Json(ExtractSkillsResponse {
        result,
        confidence_score,
    })
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let bind = std::env::var("AI_BIND").unwrap_or_else(|_| "127.0.0.1:9000".to_string());

    println!("=== Expert Registry AI Placeholder ===");

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(info_handler))
        .route("/generate-profile", post(generate_profile_handler))
        .route("/suggest-isced", post(suggest_isced_handler))
        .route("/extract-skills", post(extract_skills_handler))
        .layer(cors);

    println!("AI placeholder listening on http://{}", bind);
    println!("\nEndpoints:");
    println!("  GET  /");
    println!("  POST /generate-profile");
    println!("  POST /suggest-isced");
    println!("  POST /extract-skills");

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggest_isced_general_keyword() {
        let suggestion = suggest_isced("Computer Engineering Department", "");
        assert_eq!(suggestion.broad_code, "06");
    }

    #[test]
    fn test_suggest_isced_specialized_overrides_general() {
        let suggestion = suggest_isced("Business", "Software Development");
        assert_eq!(suggestion.broad_code, "06");
        assert!(suggestion.confidence >= 0.85);
    }

    #[test]
    fn test_suggest_isced_default() {
        let suggestion = suggest_isced("Underwater Basket Weaving", "");
        assert_eq!(suggestion.broad_code, "00");
        assert_eq!(suggestion.broad_name, "Generic programmes and qualifications");
        assert_eq!(suggestion.confidence, 0.5);
    }

    #[test]
    fn test_suggest_isced_empty_input_defaults() {
        let suggestion = suggest_isced("", "");
        assert_eq!(suggestion.broad_code, "00");
    }

    #[test]
    fn test_confidence_stays_in_range_and_is_stable() {
        for seed in ["a", "hello", "Business Administration"] {
            let first = synthetic_confidence(seed, 0.7, 0.9);
            let second = synthetic_confidence(seed, 0.7, 0.9);
            assert!((0.7..=0.9).contains(&first));
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_synthetic_skills_counts_and_determinism() {
        let skills = synthetic_skills("seed text");
        assert!(skills.len() >= 7 && skills.len() <= 13);
        assert_eq!(skills, synthetic_skills("seed text"));
    }

    #[test]
    fn test_synthetic_profile_mentions_inputs() {
        let req = ProfileRequest {
            name: Some("Dr. Alice".to_string()),
            designation: Some("Professor".to_string()),
            institution: Some("University of Bahrain".to_string()),
            general_area: Some("Chemistry".to_string()),
        };
        let profile = synthetic_profile(&req);
        assert!(profile.contains("Dr. Alice"));
        assert!(profile.contains("Professor"));
        assert!(profile.contains("University of Bahrain"));
        assert!(profile.contains("Chemistry"));
    }
}
