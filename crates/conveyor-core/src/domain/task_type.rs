//! Task type: the closed set of processing capabilities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kinds of work the service knows how to dispatch.
///
/// Design:
/// - A closed enum instead of free-form strings: an unknown type cannot get
///   past the compiler, and matches stay exhaustive when a variant is added.
/// - Wire names are the snake_case strings submitters use, and the same
///   strings appear in the persisted queue layout.
///
/// Adding a capability is one variant here plus a `DispatchTable::register`
/// call; dispatch and worker logic are untouched.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    StepDetection,
    OcrExtraction,
    ContentGeneration,
    VoiceSynthesis,
    ImageAnalysis,
}

impl TaskType {
    /// Every task type, in display order.
    pub const ALL: [TaskType; 5] = [
        TaskType::StepDetection,
        TaskType::OcrExtraction,
        TaskType::ContentGeneration,
        TaskType::VoiceSynthesis,
        TaskType::ImageAnalysis,
    ];

    /// The wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::StepDetection => "step_detection",
            TaskType::OcrExtraction => "ocr_extraction",
            TaskType::ContentGeneration => "content_generation",
            TaskType::VoiceSynthesis => "voice_synthesis",
            TaskType::ImageAnalysis => "image_analysis",
        }
    }

    /// Key of this type's pending queue in the persisted layout.
    pub fn queue_name(self) -> String {
        format!("queue:{}", self.as_str())
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
