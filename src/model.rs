use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::settings::{ColorThresholds, RankingWeights};

/// Ordinal class-proficiency tier with its default CASAS targets (scale scores).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaceLevel {
    pub level: u8,
    pub name: &'static str,
    pub reading_target: f64,
    pub listening_target: f64,
}

pub const CACE_LEVELS: [CaceLevel; 6] = [
    CaceLevel {
        level: 0,
        name: "Literacy",
        reading_target: 181.0,
        listening_target: 181.0,
    },
    CaceLevel {
        level: 1,
        name: "Low Beginning",
        reading_target: 191.0,
        listening_target: 189.0,
    },
    CaceLevel {
        level: 2,
        name: "High Beginning",
        reading_target: 201.0,
        listening_target: 200.0,
    },
    CaceLevel {
        level: 3,
        name: "Low Intermediate",
        reading_target: 211.0,
        listening_target: 210.0,
    },
    CaceLevel {
        level: 4,
        name: "High Intermediate",
        reading_target: 221.0,
        listening_target: 219.0,
    },
    CaceLevel {
        level: 5,
        name: "Advanced",
        reading_target: 236.0,
        listening_target: 228.0,
    },
];

pub fn cace_level(level: i64) -> Option<&'static CaceLevel> {
    usize::try_from(level).ok().and_then(|i| CACE_LEVELS.get(i))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub schedule: String,
    pub academic_year: String,
    pub cace_level: u8,
    #[serde(default)]
    pub weights: RankingWeights,
    #[serde(default)]
    pub thresholds: ColorThresholds,
    pub created_at: String,
}

impl Class {
    pub fn level(&self) -> &'static CaceLevel {
        cace_level(i64::from(self.cace_level)).unwrap_or(&CACE_LEVELS[0])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub class_id: String,
    pub name: String,
    pub enrolled_on: NaiveDate,
    #[serde(default)]
    pub dropped: bool,
    #[serde(default)]
    pub dropped_on: Option<NaiveDate>,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub attendance: Vec<AttendanceEntry>,
    #[serde(default)]
    pub test_scores: Vec<TestScore>,
    #[serde(default)]
    pub casas_scores: Vec<CasasScore>,
    #[serde(default)]
    pub notes: Vec<Note>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    pub id: String,
    pub date: NaiveDate,
    pub present: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestScore {
    pub id: String,
    pub subject: String,
    pub date: NaiveDate,
    pub score: f64,
    pub max_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CasasKind {
    Reading,
    Listening,
}

impl CasasKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CasasKind::Reading => "reading",
            CasasKind::Listening => "listening",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reading" => Some(CasasKind::Reading),
            "listening" => Some(CasasKind::Listening),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CasasScore {
    pub id: String,
    pub kind: CasasKind,
    pub date: NaiveDate,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub date: NaiveDate,
    pub text: String,
}
