use anyhow::Result;
use std::{collections::HashSet, fs, path::Path, process};

use crate::levels::{find_levels_root, LevelsToml, DEFAULT_DIFFICULTIES};
use crate::state::{GameState, GameStatus};

/// Exit codes for validation failures
const EXIT_CODE_VALIDATION_ERROR: i32 = 1;
const EXIT_CODE_IO_ERROR: i32 = 2;
const EXIT_CODE_PARSE_ERROR: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValidationIssueKind {
    Io,
    Parse,
    Validation,
}

impl ValidationIssueKind {
    fn label(self) -> &'static str {
        match self {
            Self::Io => "io",
            Self::Parse => "parse",
            Self::Validation => "validation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ValidationIssue {
    kind: ValidationIssueKind,
    message: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct ValidationReport {
    issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn push(&mut self, kind: ValidationIssueKind, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            kind,
            message: message.into(),
        });
    }

    fn extend(&mut self, mut other: ValidationReport) {
        self.issues.append(&mut other.issues);
    }

    fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    fn has(&self, kind: ValidationIssueKind) -> bool {
        self.issues.iter().any(|issue| issue.kind == kind)
    }

    fn exit_code(&self) -> i32 {
        if self.has(ValidationIssueKind::Parse) {
            EXIT_CODE_PARSE_ERROR
        } else if self.has(ValidationIssueKind::Io) {
            EXIT_CODE_IO_ERROR
        } else {
            EXIT_CODE_VALIDATION_ERROR
        }
    }

    fn format_for_stderr(&self) -> String {
        let mut output = format!("Validation failed with {} issue(s):", self.issues.len());
        for (index, issue) in self.issues.iter().enumerate() {
            output.push_str(&format!(
                "\n  {}. [{}] {}",
                index + 1,
                issue.kind.label(),
                issue.message
            ));
        }

        output
    }
}

pub fn run_validate_levels_toml() -> Result<()> {
    let levels_root = find_levels_root()?;
    let report = validate_all_levels_toml_with_root(&levels_root);

    if report.is_empty() {
        println!("✓ All levels.toml files are valid");
        return Ok(());
    }

    eprintln!("{}", report.format_for_stderr());
    process::exit(report.exit_code());
}

fn validate_all_levels_toml_with_root(levels_root: &Path) -> ValidationReport {
    let mut report = ValidationReport::default();

    for difficulty in DEFAULT_DIFFICULTIES {
        let difficulty_dir = levels_root.join(difficulty);
        report.extend(validate_difficulty_levels_toml(&difficulty_dir, difficulty));
    }

    report
}

fn validate_difficulty_levels_toml(difficulty_dir: &Path, difficulty: &str) -> ValidationReport {
    let mut report = ValidationReport::default();
    let levels_toml_path = difficulty_dir.join("levels.toml");

    if !levels_toml_path.exists() {
        report.push(
            ValidationIssueKind::Io,
            format!(
                "levels.toml not found for difficulty '{}': {}",
                difficulty,
                levels_toml_path.display()
            ),
        );
        return report;
    }

    let levels_toml = match parse_levels_toml(&levels_toml_path, difficulty) {
        Ok(levels_toml) => levels_toml,
        Err(issue) => {
            report.issues.push(issue);
            return report;
        },
    };

    let mut seen_files = HashSet::new();
    for (index, level_entry) in levels_toml.level.iter().enumerate() {
        let Some(file_name) = level_entry.file.as_ref() else {
            report.push(
                ValidationIssueKind::Validation,
                format!(
                    "Missing 'file' field for difficulty '{}' at entry index {} in {}",
                    difficulty,
                    index,
                    levels_toml_path.display()
                ),
            );
            continue;
        };

        if !seen_files.insert(file_name.as_str()) {
            report.push(
                ValidationIssueKind::Validation,
                format!(
                    "Level file '{}' is listed more than once in {}",
                    file_name,
                    levels_toml_path.display()
                ),
            );
            continue;
        }

        if let Some(declared) = level_entry.difficulty.as_deref() {
            if declared != difficulty {
                report.push(
                    ValidationIssueKind::Validation,
                    format!(
                        "Level '{}' declares difficulty '{}' but lives under '{}'",
                        file_name, declared, difficulty
                    ),
                );
            }
        }

        let level_path = difficulty_dir.join(file_name);
        if !level_path.exists() {
            report.push(
                ValidationIssueKind::Io,
                format!(
                    "Referenced level file does not exist: {} (from {})",
                    level_path.display(),
                    levels_toml_path.display()
                ),
            );
            continue;
        }

        if let Some(issue) = validate_level_text(&level_path) {
            report.issues.push(issue);
        }
    }

    report
}

fn parse_levels_toml(
    path: &Path,
    difficulty: &str,
) -> std::result::Result<LevelsToml, ValidationIssue> {
    let contents = fs::read_to_string(path).map_err(|error| ValidationIssue {
        kind: ValidationIssueKind::Io,
        message: format!(
            "Failed to read levels.toml for difficulty '{}': {} ({error})",
            difficulty,
            path.display()
        ),
    })?;

    toml::from_str::<LevelsToml>(&contents).map_err(|error| ValidationIssue {
        kind: ValidationIssueKind::Parse,
        message: format!(
            "Failed to parse levels.toml for difficulty '{}': {} ({error})",
            difficulty,
            path.display()
        ),
    })
}

fn validate_level_text(path: &Path) -> Option<ValidationIssue> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) => {
            return Some(ValidationIssue {
                kind: ValidationIssueKind::Io,
                message: format!("Failed to read level file: {} ({error})", path.display()),
            });
        },
    };

    match GameState::parse(&content) {
        Ok(state) if state.status() != GameStatus::NotOver => Some(ValidationIssue {
            kind: ValidationIssueKind::Validation,
            message: format!(
                "Level starts already {}: {}",
                state.status().label(),
                path.display()
            ),
        }),
        Ok(state) if state.live_snake_count() == 0 => Some(ValidationIssue {
            kind: ValidationIssueKind::Validation,
            message: format!("Level has no snake: {}", path.display()),
        }),
        Ok(_) => None,
        Err(error) => Some(ValidationIssue {
            kind: ValidationIssueKind::Parse,
            message: format!("Failed to parse level text: {} ({error})", path.display()),
        }),
    }
}
