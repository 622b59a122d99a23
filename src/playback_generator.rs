use crate::levels;
use crate::playback::write_playback;
use crate::solver::{self, SolveOptions, SolveOutcome};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Result of playback generation for a single level
#[derive(Debug, Clone)]
pub struct PlaybackResult {
    pub level_id: String,
    pub level_path: PathBuf,
    pub playback_path: PathBuf,
    pub solved: bool,
    pub error: Option<String>,
}

/// Solve one level with the options from its `levels.toml` and write the
/// playback when a solution exists.
pub fn generate_playback_for_level(
    level_path: &Path,
    playback_path: &Path,
    budget: &SolveOptions,
) -> Result<PlaybackResult> {
    let level_id = level_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid level filename"))?
        .to_string();

    let level = levels::load_level(level_path)?;
    let options = SolveOptions {
        engine: levels::options_for_level(level_path)?,
        ..budget.clone()
    };
    let report = solver::solve(&level, &options)
        .with_context(|| format!("Solver failed on {}", level_path.display()))?;

    let solved = report.outcome == SolveOutcome::SolutionFound;
    let error = if solved {
        write_playback(playback_path, &report.path)?;
        None
    } else {
        Some(format!(
            "{} after {} states (depth {})",
            report.outcome.label(),
            report.states_seen,
            report.last_depth
        ))
    };

    Ok(PlaybackResult {
        level_id,
        level_path: level_path.to_path_buf(),
        playback_path: playback_path.to_path_buf(),
        solved,
        error,
    })
}

/// Generate playbacks for every level listed in a difficulty's `levels.toml`
pub fn generate_playbacks_for_difficulty(
    levels_dir: &Path,
    playbacks_dir: &Path,
    budget: &SolveOptions,
) -> Result<Vec<PlaybackResult>> {
    let mut results = Vec::new();

    let levels_toml_path = levels_dir.join("levels.toml");
    if !levels_toml_path.exists() {
        log::debug!("no levels.toml in {}", levels_dir.display());
        return Ok(results);
    }
    let levels_toml = levels::read_levels_toml(&levels_toml_path)?;

    for filename in levels_toml.level.iter().filter_map(|entry| entry.file.as_deref()) {
        let path = levels_dir.join(filename);
        let playback_path = playbacks_dir.join(filename).with_extension("json");

        match generate_playback_for_level(&path, &playback_path, budget) {
            Ok(result) => {
                if !result.solved {
                    eprintln!(
                        "Warning: Failed to solve level {} - {}",
                        result.level_id,
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                }
                results.push(result);
            },
            Err(e) => {
                eprintln!("Error processing level {}: {:#}", filename, e);
            },
        }
    }

    Ok(results)
}

/// Generate playbacks for the selected difficulty folders
pub fn generate_all_playbacks(
    levels_root: &Path,
    playbacks_root: &Path,
    difficulties: &[&str],
    budget: &SolveOptions,
) -> Result<Vec<PlaybackResult>> {
    let mut all_results = Vec::new();

    for difficulty in difficulties {
        let levels_dir = levels_root.join(difficulty);
        let playbacks_dir = playbacks_root.join(difficulty);

        if levels_dir.exists() {
            let results = generate_playbacks_for_difficulty(&levels_dir, &playbacks_dir, budget)
                .with_context(|| format!("Failed to generate playbacks for {}", difficulty))?;
            all_results.extend(results);
        }
    }

    Ok(all_results)
}

/// Get lists of solved and unsolved level IDs
pub fn get_solved_unsolved_lists(results: &[PlaybackResult]) -> (Vec<String>, Vec<String>) {
    let mut solved = Vec::new();
    let mut unsolved = Vec::new();

    for result in results {
        if result.solved {
            solved.push(result.level_id.clone());
        } else {
            unsolved.push(result.level_id.clone());
        }
    }

    (solved, unsolved)
}

/// Update levels.toml solved status based on playback generation results
pub fn update_solved_status_from_results(results: &[PlaybackResult]) -> Result<()> {
    for result in results {
        levels::update_solved_status(&result.level_path, result.solved).with_context(|| {
            format!(
                "Failed to update solved status for level: {}",
                result.level_id
            )
        })?;
    }
    Ok(())
}

/// Entry point of the `generate-playbacks` command.
pub fn run_generate_playbacks(difficulty: Option<&str>, budget: &SolveOptions) -> Result<()> {
    let levels_root = levels::find_levels_root()?;
    let playbacks_root = levels_root
        .parent()
        .unwrap_or(&levels_root)
        .join("playbacks");
    let difficulties = levels::selected_difficulties(difficulty)?;

    let results = generate_all_playbacks(&levels_root, &playbacks_root, &difficulties, budget)?;
    update_solved_status_from_results(&results)?;

    let (solved, unsolved) = get_solved_unsolved_lists(&results);
    println!(
        "Generated {} playback(s); {} level(s) unsolved",
        solved.len(),
        unsolved.len()
    );
    for level_id in &unsolved {
        println!("  - {level_id}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::{read_levels_toml, write_levels_toml, LevelMeta, LevelsToml};
    use crate::playback::load_playback;
    use std::time::Duration;
    use std::fs;
    use tempfile::TempDir;

    fn write_level(dir: &Path, name: &str, text: &str) -> PathBuf {
        fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_get_solved_unsolved_lists() {
        let results = vec![
            PlaybackResult {
                level_id: "level1".to_string(),
                level_path: PathBuf::from("level1.txt"),
                playback_path: PathBuf::from("level1.json"),
                solved: true,
                error: None,
            },
            PlaybackResult {
                level_id: "level2".to_string(),
                level_path: PathBuf::from("level2.txt"),
                playback_path: PathBuf::from("level2.json"),
                solved: false,
                error: Some("not possible".to_string()),
            },
        ];

        let (solved, unsolved) = get_solved_unsolved_lists(&results);
        assert_eq!(solved, vec!["level1"]);
        assert_eq!(unsolved, vec!["level2"]);
    }

    #[test]
    fn test_generate_playback_for_solvable_level() {
        let temp_dir = TempDir::new().unwrap();
        let level_path = write_level(temp_dir.path(), "walk.txt", ">R...X\n######");
        let playback_path = temp_dir.path().join("out/walk.json");

        let result =
            generate_playback_for_level(&level_path, &playback_path, &SolveOptions::default())
                .unwrap();
        assert!(result.solved);
        assert_eq!(result.level_id, "walk");

        let steps = load_playback(&playback_path).unwrap();
        assert_eq!(steps.len(), 4);
    }

    #[test]
    fn test_generate_playback_for_unsolvable_level_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let level_path = write_level(temp_dir.path(), "stuck.txt", "#####\n#>R##\n#####\n...X.");
        let playback_path = temp_dir.path().join("stuck.json");

        let result =
            generate_playback_for_level(&level_path, &playback_path, &SolveOptions::default())
                .unwrap();
        assert!(!result.solved);
        assert!(result.error.unwrap().contains("not possible"));
        assert!(!playback_path.exists());
    }

    #[test]
    fn test_generate_playback_uses_level_options() {
        let temp_dir = TempDir::new().unwrap();
        let level_path = write_level(temp_dir.path(), "wrap.txt", "X.>R\n####");
        let levels_toml = LevelsToml {
            level: vec![LevelMeta {
                file: Some("wrap.txt".to_string()),
                options: Some(crate::models::EngineOptions {
                    fall_through: true,
                    ..Default::default()
                }),
                ..Default::default()
            }],
        };
        write_levels_toml(&temp_dir.path().join("levels.toml"), &levels_toml).unwrap();

        let budget = SolveOptions {
            max_depth: 1,
            time_limit: Duration::from_secs(5),
            ..SolveOptions::default()
        };
        let result =
            generate_playback_for_level(&level_path, &temp_dir.path().join("wrap.json"), &budget)
                .unwrap();
        assert!(result.solved);
    }

    #[test]
    fn test_generate_all_playbacks_updates_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let levels_root = temp_dir.path().join("levels");
        let playbacks_root = temp_dir.path().join("playbacks");
        let easy_dir = levels_root.join("easy");
        write_level(&easy_dir, "walk.txt", ">R...X\n######");
        write_level(&easy_dir, "notes.md", "not a level");
        write_level(&easy_dir, "unlisted.txt", ">R.X\n####");
        let levels_toml = LevelsToml {
            level: vec![LevelMeta {
                file: Some("walk.txt".to_string()),
                solved: Some(false),
                ..Default::default()
            }],
        };
        write_levels_toml(&easy_dir.join("levels.toml"), &levels_toml).unwrap();

        let results = generate_all_playbacks(
            &levels_root,
            &playbacks_root,
            &["easy", "hard"],
            &SolveOptions::default(),
        )
        .unwrap();
        assert_eq!(results.len(), 1);
        assert!(playbacks_root.join("easy/walk.json").exists());
        assert!(!playbacks_root.join("easy/unlisted.json").exists());

        update_solved_status_from_results(&results).unwrap();
        let updated = read_levels_toml(&easy_dir.join("levels.toml")).unwrap();
        assert_eq!(updated.level[0].solved, Some(true));
    }
}
