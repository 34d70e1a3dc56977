// src/app.rs

use vanguard_deep_scan::{FindingType, Grade, ScanRequest, ScanResult, Scanner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Idle,
    Scanning,
    Finished,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub score: Option<u8>,
    pub grade: Option<Grade>,
    pub danger_issues: usize,
    pub warning_issues: usize,
}

pub struct App {
    pub state: AppState,
    pub scan_result: Option<ScanResult>,
    pub summary: ScanSummary,
    scanner: Scanner,
}

impl App {
    pub fn new(scanner: Scanner) -> Self {
        Self {
            state: AppState::Idle,
            scan_result: None,
            summary: ScanSummary::default(),
            scanner,
        }
    }

    /// Runs one scan to completion and keeps its result.
    pub async fn run(&mut self, request: ScanRequest) -> &ScanResult {
        self.state = AppState::Scanning;
        let result = self.scanner.scan(request).await;
        self.finish(result)
    }

    fn finish(&mut self, result: ScanResult) -> &ScanResult {
        self.state = AppState::Finished;
        self.summary = summarize(&result);
        self.scan_result.insert(result)
    }

    pub fn succeeded(&self) -> bool {
        self.scan_result.as_ref().is_some_and(|r| r.success)
    }

    pub fn render_json(&self, compact: bool) -> serde_json::Result<String> {
        match (&self.scan_result, compact) {
            (Some(result), true) => serde_json::to_string(result),
            (Some(result), false) => serde_json::to_string_pretty(result),
            (None, _) => Ok("null".to_string()),
        }
    }

    /// One line for stderr, e.g. `example.com: A (94/100), 0 danger, 2 warning [completed]`.
    pub fn summary_line(&self) -> String {
        let Some(result) = &self.scan_result else {
            return "no scan has run".to_string();
        };
        if let Some(error) = &result.error {
            return format!("{}: scan failed: {error}", result.target);
        }

        let grade = match (self.summary.grade, self.summary.score) {
            (Some(grade), Some(score)) => format!("{grade} ({score}/100)"),
            _ => format!("{} mode, ungraded", result.scan_mode),
        };
        format!(
            "{}: {grade}, {} danger, {} warning [{}]",
            result.hostname.as_deref().unwrap_or(&result.target),
            self.summary.danger_issues,
            self.summary.warning_issues,
            result.status
        )
    }
}

fn summarize(result: &ScanResult) -> ScanSummary {
    let count = |kind: FindingType| result.findings.iter().filter(|f| f.kind == kind).count();
    ScanSummary {
        score: result.security_score,
        grade: result.security_grade,
        danger_issues: count(FindingType::Danger),
        warning_issues: count(FindingType::Warning),
    }
}
