use serde::{Deserialize, Serialize};

use crate::profile::models::ProfileDocument;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Strong,
    Moderate,
    Weak,
    Missing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionHealth {
    pub section: String,
    pub score: f64,
    pub entry_count: usize,
    pub status: SectionStatus,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletenessReport {
    pub overall_score: f64,
    pub sections: Vec<SectionHealth>,
    pub missing_sections: Vec<String>,
}

const SECTION_WEIGHTS: &[(&str, f64)] = &[
    ("personal_information", 0.25),
    ("experience", 0.25),
    ("education", 0.15),
    ("skills", 0.15),
    ("certifications", 0.10),
    ("avatar", 0.10),
];

/// Scores each section 0.0–1.0 and combines them with `SECTION_WEIGHTS`.
pub fn compute_completeness_report(doc: &ProfileDocument) -> CompletenessReport {
    let mut sections = Vec::new();
    let mut weighted_score_sum = 0.0;
    let mut missing_sections = Vec::new();

    for (section_key, weight) in SECTION_WEIGHTS {
        let (score, entry_count, mut recommendations) = score_section(doc, section_key);

        let status = match score {
            s if s >= 0.8 => SectionStatus::Strong,
            s if s >= 0.5 => SectionStatus::Moderate,
            s if s > 0.0 => SectionStatus::Weak,
            _ => SectionStatus::Missing,
        };
        if status == SectionStatus::Missing {
            missing_sections.push(section_key.to_string());
            if recommendations.is_empty() {
                recommendations.push(format!("Add your {} to strengthen your profile", section_key.replace('_', " ")));
            }
        }

        weighted_score_sum += score * weight;
        sections.push(SectionHealth {
            section: section_key.to_string(),
            score,
            entry_count,
            status,
            recommendations,
        });
    }

    let total_weight: f64 = SECTION_WEIGHTS.iter().map(|(_, w)| w).sum();
    let overall_score = if total_weight > 0.0 {
        (weighted_score_sum / total_weight).clamp(0.0, 1.0)
    } else {
        0.0
    };

    CompletenessReport {
        overall_score,
        sections,
        missing_sections,
    }
}

fn score_section(doc: &ProfileDocument, section: &str) -> (f64, usize, Vec<String>) {
    let mut recs = Vec::new();
    match section {
        "personal_information" => {
            let pi = &doc.personal_information;
            let optional = [&pi.headline, &pi.bio, &pi.location];
            let filled = optional.iter().filter(|f| f.as_deref().is_some_and(|s| !s.trim().is_empty())).count();
            if pi.headline.is_none() {
                recs.push("Add a headline so buyers know what you do".to_string());
            }
            if pi.bio.is_none() {
                recs.push("Write a short bio".to_string());
            }
            // Names are mandatory, so the section is never below 0.4.
            (0.4 + 0.2 * filled as f64, 1, recs)
        }
        "experience" => {
            let n = doc.experience.len();
            let described = doc.experience.iter().filter(|e| e.description.is_some()).count();
            if n > 0 && described < n {
                recs.push(format!("{} experience entries have no description", n - described));
            }
            if n == 1 {
                recs.push("Add more experience entries to build a complete picture".to_string());
            }
            if n == 0 {
                return (0.0, 0, recs);
            }
            let breadth = if n == 1 { 0.6 } else { 1.0 };
            let detail = 0.7 + 0.3 * described as f64 / n as f64;
            (breadth * detail, n, recs)
        }
        "education" => {
            let n = doc.education.len();
            (if n == 0 { 0.0 } else { 1.0 }, n, recs)
        }
        "skills" => {
            let n = doc.skills.len();
            if (1..5).contains(&n) {
                recs.push("List at least 5 skills".to_string());
            }
            ((n as f64 / 5.0).min(1.0), n, recs)
        }
        "certifications" => {
            let n = doc.certifications.len();
            let with_file = doc.certifications.iter().filter(|c| c.certificate.is_some()).count();
            if n > with_file {
                recs.push(format!("Upload certificate files for {} certifications", n - with_file));
            }
            let score = if n == 0 { 0.0 } else { 0.6 + 0.4 * with_file as f64 / n as f64 };
            (score, n, recs)
        }
        "avatar" => {
            let has = doc.avatar.is_some();
            if !has {
                recs.push("Upload a profile photo".to_string());
            }
            (if has { 1.0 } else { 0.0 }, usize::from(has), recs)
        }
        _ => (0.0, 0, recs),
    }
}
