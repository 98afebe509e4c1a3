use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{HighlightError, Result};
use crate::vision::frames::frame_second;

lazy_static! {
    static ref QUOTED_TEXT: Regex = Regex::new(r"'(.*?)'").expect("quoted text pattern is valid");
    static ref ROUND_TIMER: Regex =
        Regex::new(r"^(\d{1,2})[:.](\d{2})$").expect("timer pattern is valid");
}

const PADDLE_SECTION_MARKER: &str = "**********";

/// Recognized text per sampled second.
pub type Detections = BTreeMap<u32, Vec<String>>;

pub trait TextRecognizer: Sync {
    /// Reads every `<second>.png` frame in `image_directory`.
    fn recognize(&self, image_directory: &Path) -> Result<Detections>;
}

/// Runs the PaddleOCR command line over a whole directory in one process.
pub struct PaddleOcr {
    command: String,
}

impl PaddleOcr {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl TextRecognizer for PaddleOcr {
    fn recognize(&self, image_directory: &Path) -> Result<Detections> {
        let directory = image_directory.to_string_lossy().trim_end_matches('/').to_string();

        let output = Command::new(&self.command)
            .arg("--image_dir")
            .arg(&directory)
            .arg("--use_angle_cls")
            .arg("false")
            .arg("--lang")
            .arg("en")
            .arg("--use_gpu")
            .arg("false")
            .arg("--enable_mkldnn")
            .arg("true")
            .arg("--use_mp")
            .arg("true")
            .arg("--show_log")
            .arg("false")
            .arg("--use_dilation")
            .arg("true")
            .arg("--det_db_score_mode")
            .arg("slow")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|error| HighlightError::tool("paddleocr", format!("failed to start: {error}")))?;

        if !output.status.success() {
            return Err(HighlightError::tool(
                "paddleocr",
                format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        // Results are interleaved across stdout and stderr depending on version.
        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        let detections = parse_paddle_output(&combined, &directory);
        tracing::debug!(
            image_directory = %image_directory.display(),
            frames = detections.len(),
            "Recognized text in frames"
        );
        Ok(detections)
    }
}

/// Sections start at `**********<dir>/<second>.png**********`; quoted strings
/// after the header are the recognized texts.
pub(crate) fn parse_paddle_output(output: &str, image_directory: &str) -> Detections {
    let header = format!("{PADDLE_SECTION_MARKER}{image_directory}/");
    let mut detections = Detections::new();

    for section in output.split(&header).skip(1) {
        let section = section.replace(PADDLE_SECTION_MARKER, "");
        let mut lines = section.lines();
        let Some(file_name) = lines.next() else {
            continue;
        };
        let Some(second) = frame_second(Path::new(file_name.trim())) else {
            continue;
        };

        let body: Vec<&str> = lines.collect();
        let texts = QUOTED_TEXT
            .captures_iter(&body.join("\n"))
            .filter_map(|capture| capture.get(1).map(|text| text.as_str().to_string()))
            .collect();
        detections.insert(second, texts);
    }

    detections
}

/// Parses `m:ss` into seconds.
pub fn parse_timer(text: &str) -> Option<u32> {
    let captures = ROUND_TIMER.captures(text.trim())?;
    let minutes: u32 = captures.get(1)?.as_str().parse().ok()?;
    let seconds: u32 = captures.get(2)?.as_str().parse().ok()?;
    (seconds < 60).then_some(minutes * 60 + seconds)
}

pub fn first_timer(texts: &[String]) -> Option<u32> {
    texts.iter().find_map(|text| parse_timer(text))
}
