use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PREPARATION_SECS: u32 = 60;
pub const AUTO_ADVANCE_SECS: u32 = 5;

/// Question style of an exam part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PartKind {
    Interview,
    Picture,
    LongTurn,
    Debate,
}

impl PartKind {
    /// Map the server's part ids ("1.1", "1.2", "2", "3") onto a kind.
    pub fn from_part_id(part_id: &str) -> Option<Self> {
        match part_id {
            "1.1" => Some(PartKind::Interview),
            "1.2" => Some(PartKind::Picture),
            "2" => Some(PartKind::LongTurn),
            "3" => Some(PartKind::Debate),
            _ => None,
        }
    }

    pub fn default_min_duration_secs(&self) -> u32 {
        match self {
            PartKind::Interview | PartKind::Picture => 5,
            PartKind::LongTurn => 10,
            PartKind::Debate => 15,
        }
    }

    pub fn default_max_duration_secs(&self) -> u32 {
        match self {
            PartKind::Interview | PartKind::Picture => 30,
            PartKind::LongTurn => 60,
            PartKind::Debate => 120,
        }
    }
}

/// A single question/topic awaiting one recorded response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSpec {
    pub text: String,
    pub min_duration_secs: u32,
    pub max_duration_secs: u32,
    pub allows_follow_up: bool,
    pub allows_preparation: bool,
}

impl PromptSpec {
    /// Prompt with the timing defaults of the given part kind.
    pub fn for_kind(text: impl Into<String>, kind: PartKind) -> Self {
        Self {
            text: text.into(),
            min_duration_secs: kind.default_min_duration_secs(),
            max_duration_secs: kind.default_max_duration_secs(),
            allows_follow_up: matches!(kind, PartKind::LongTurn | PartKind::Debate),
            allows_preparation: matches!(kind, PartKind::LongTurn),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateSpec {
    pub topic: String,
    pub for_points: Vec<String>,
    pub against_points: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebateSide {
    For,
    Against,
}

impl DebateSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebateSide::For => "for",
            DebateSide::Against => "against",
        }
    }
}

/// A named segment of the exam with its own question set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartSpec {
    pub part_id: String,
    pub kind: PartKind,
    pub prompts: Vec<PromptSpec>,
    pub images: Vec<String>,
    pub debate: Option<DebateSpec>,
}

impl PartSpec {
    pub fn new(part_id: impl Into<String>, kind: PartKind) -> Self {
        Self {
            part_id: part_id.into(),
            kind,
            prompts: Vec::new(),
            images: Vec::new(),
            debate: None,
        }
    }

    /// A debate part has exactly one answerable prompt (the topic);
    /// other parts answer their question list in order.
    pub fn prompt_count(&self) -> usize {
        match self.kind {
            PartKind::Debate => usize::from(self.debate.is_some()),
            _ => self.prompts.len(),
        }
    }
}

/// Ordered part list for one session. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamDefinition {
    pub parts: Vec<PartSpec>,
}

impl ExamDefinition {
    pub fn part(&self, index: usize) -> Option<&PartSpec> {
        self.parts.get(index)
    }
}

/// One answered prompt. Append-only; ordering is answer order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub id: String,
    pub part_id: String,
    pub prompt_text: String,
    pub transcript: String,
    pub duration_secs: u32,
    pub debate_side: Option<DebateSide>,
    pub recorded_at: DateTime<Utc>,
}

impl ResponseRecord {
    pub fn new(
        part_id: impl Into<String>,
        prompt_text: impl Into<String>,
        transcript: impl Into<String>,
        duration_secs: u32,
        debate_side: Option<DebateSide>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            part_id: part_id.into(),
            prompt_text: prompt_text.into(),
            transcript: transcript.into(),
            duration_secs,
            debate_side,
            recorded_at: Utc::now(),
        }
    }

    pub fn word_count(&self) -> usize {
        self.transcript.split_whitespace().count()
    }

    /// Read-only projection; never stored as state.
    pub fn words_per_minute(&self) -> f32 {
        if self.duration_secs == 0 {
            return 0.0;
        }
        (self.word_count() as f32 / self.duration_secs as f32) * 60.0
    }
}

/// Capture lifecycle as the engine tracks it. Exactly one value at a time;
/// no two recordings may be in flight concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordingPhase {
    Idle,
    Recording,
    Processing,
}

/// Synthesis voices offered for prompt playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Sarah,
    Lily,
    Charlie,
    Roger,
}

impl Voice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Voice::Sarah => "sarah",
            Voice::Lily => "lily",
            Voice::Charlie => "charlie",
            Voice::Roger => "roger",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "sarah" => Some(Voice::Sarah),
            "lily" => Some(Voice::Lily),
            "charlie" => Some(Voice::Charlie),
            "roger" => Some(Voice::Roger),
            _ => None,
        }
    }
}

/// Examiner mood forwarded with the finalization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Happy,
    Normal,
    Angry,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Happy => "happy",
            Mood::Normal => "normal",
            Mood::Angry => "angry",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "happy" => Mood::Happy,
            "angry" => Mood::Angry,
            _ => Mood::Normal,
        }
    }
}

impl Default for Mood {
    fn default() -> Self {
        Mood::Normal
    }
}
