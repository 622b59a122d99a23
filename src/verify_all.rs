use crate::{levels, verify};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

pub fn run_verify_all() -> Result<()> {
    let levels_root = levels::find_levels_root()?;
    let mut any_failed = false;

    for difficulty in levels::DEFAULT_DIFFICULTIES {
        let levels_toml_path = levels_root.join(difficulty).join("levels.toml");
        if !levels_toml_path.exists() {
            continue;
        }

        let mut levels_toml = levels::read_levels_toml(&levels_toml_path)?;
        let mut updated = false;

        for entry in &mut levels_toml.level {
            let Some(file) = entry.file.as_deref() else {
                continue;
            };
            let level_path = levels_root.join(difficulty).join(file);
            if !level_path.exists() {
                bail!("Level file not found: {}", level_path.display());
            }

            let playback_path = infer_playback_path(&levels_root, &level_path)?;
            if !playback_path.exists() {
                log::debug!("no playback for {}", level_path.display());
                continue;
            }

            let options = entry.options.unwrap_or_default();
            match verify::verify_level(&level_path, &playback_path, &options) {
                Ok(()) => {
                    println!("ok      {difficulty}/{file}");
                    entry.solved = Some(true);
                },
                Err(error) => {
                    entry.solved = Some(false);
                    any_failed = true;
                    eprintln!(
                        "Verification failed for {}: {error:#}",
                        level_path.display()
                    );
                },
            }
            updated = true;
        }

        if updated {
            levels::write_levels_toml(&levels_toml_path, &levels_toml)
                .with_context(|| format!("Failed to write {}", levels_toml_path.display()))?;
        }
    }

    if any_failed {
        bail!("One or more levels failed verification")
    } else {
        Ok(())
    }
}

/// Playback path for a level under `levels_root`, with a `.json` extension.
pub fn infer_playback_path(levels_root: &Path, level_path: &Path) -> Result<PathBuf> {
    let relative = level_path.strip_prefix(levels_root).with_context(|| {
        format!(
            "Level path {} is not under levels root {}",
            level_path.display(),
            levels_root.display()
        )
    })?;
    let mut playback = levels_root
        .parent()
        .unwrap_or(levels_root)
        .join("playbacks");
    for component in relative.components() {
        playback.push(component);
    }
    playback.set_extension("json");
    Ok(playback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::{read_levels_toml, write_levels_toml, LevelMeta, LevelsToml};
    use crate::models::EngineOptions;
    use crate::test_cwd::CwdGuard;
    use std::fs;
    use tempfile::TempDir;

    const WALK_RIGHT: &str = ">R...X\n######";

    fn write_levels_metadata(
        levels_toml_path: &Path,
        file: &str,
        solved: Option<bool>,
        options: Option<EngineOptions>,
    ) {
        let levels_toml = LevelsToml {
            level: vec![LevelMeta {
                id: Some("verify-all-level".to_string()),
                file: Some(file.to_string()),
                author: Some("snakefall".to_string()),
                solved,
                difficulty: Some("easy".to_string()),
                tags: Some(vec![]),
                description: Some("Verify-all test level".to_string()),
                options,
            }],
        };
        write_levels_toml(levels_toml_path, &levels_toml).unwrap();
    }

    fn setup(temp_dir: &TempDir) -> (PathBuf, PathBuf) {
        let easy_dir = temp_dir.path().join("levels/easy");
        let playbacks_dir = temp_dir.path().join("playbacks/easy");
        fs::create_dir_all(&easy_dir).unwrap();
        fs::create_dir_all(&playbacks_dir).unwrap();
        (easy_dir, playbacks_dir)
    }

    #[test]
    fn test_infer_playback_path_swaps_root_and_extension() {
        let temp_dir = TempDir::new().unwrap();
        let levels_root = temp_dir.path().join("levels");
        let level = levels_root.join("easy/ledge.txt");

        let playback = infer_playback_path(&levels_root, &level).unwrap();
        assert_eq!(playback, temp_dir.path().join("playbacks/easy/ledge.json"));
    }

    #[test]
    fn test_infer_playback_path_fails_when_level_outside_root() {
        let temp_dir = TempDir::new().unwrap();
        let levels_root = temp_dir.path().join("levels");
        let external_level = temp_dir.path().join("outside/level.txt");

        let error = infer_playback_path(&levels_root, &external_level).unwrap_err();
        assert!(error.to_string().contains("is not under levels root"));
    }

    #[test]
    fn test_run_verify_all_fails_when_level_file_missing() {
        let temp_dir = TempDir::new().unwrap();
        let (easy_dir, _) = setup(&temp_dir);
        write_levels_metadata(&easy_dir.join("levels.toml"), "missing.txt", Some(true), None);
        let _cwd = CwdGuard::set(temp_dir.path());

        let error = run_verify_all().unwrap_err();
        assert!(error.to_string().contains("Level file not found"));
    }

    #[test]
    fn test_run_verify_all_skips_missing_playback_without_mutating_status() {
        let temp_dir = TempDir::new().unwrap();
        let (easy_dir, _) = setup(&temp_dir);
        fs::write(easy_dir.join("walk.txt"), WALK_RIGHT).unwrap();
        write_levels_metadata(&easy_dir.join("levels.toml"), "walk.txt", Some(true), None);

        let _cwd = CwdGuard::set(temp_dir.path());
        run_verify_all().expect("verify-all should skip missing playback files");

        let updated = read_levels_toml(&easy_dir.join("levels.toml")).unwrap();
        assert_eq!(updated.level[0].solved, Some(true));
    }

    #[test]
    fn test_run_verify_all_marks_solved_level() {
        let temp_dir = TempDir::new().unwrap();
        let (easy_dir, playbacks_dir) = setup(&temp_dir);
        fs::write(easy_dir.join("walk.txt"), WALK_RIGHT).unwrap();
        fs::write(
            playbacks_dir.join("walk.json"),
            r#"[{"key": "R"}, {"key": "R"}, {"key": "R"}, {"key": "R"}]"#,
        )
        .unwrap();
        write_levels_metadata(&easy_dir.join("levels.toml"), "walk.txt", None, None);

        let _cwd = CwdGuard::set(temp_dir.path());
        run_verify_all().unwrap();

        let updated = read_levels_toml(&easy_dir.join("levels.toml")).unwrap();
        assert_eq!(updated.level[0].solved, Some(true));
    }

    #[test]
    fn test_run_verify_all_marks_unsolved_when_playback_is_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let (easy_dir, playbacks_dir) = setup(&temp_dir);
        fs::write(easy_dir.join("walk.txt"), WALK_RIGHT).unwrap();
        fs::write(playbacks_dir.join("walk.json"), "{malformed-json}").unwrap();
        write_levels_metadata(&easy_dir.join("levels.toml"), "walk.txt", Some(true), None);

        let _cwd = CwdGuard::set(temp_dir.path());
        let error = run_verify_all().unwrap_err();
        assert!(error
            .to_string()
            .contains("One or more levels failed verification"));

        let updated = read_levels_toml(&easy_dir.join("levels.toml")).unwrap();
        assert_eq!(updated.level[0].solved, Some(false));
    }

    #[test]
    fn test_run_verify_all_applies_level_options() {
        let temp_dir = TempDir::new().unwrap();
        let (easy_dir, playbacks_dir) = setup(&temp_dir);
        // The only way to the target wraps around the right edge.
        fs::write(easy_dir.join("wrap.txt"), "X.>R\n####").unwrap();
        fs::write(playbacks_dir.join("wrap.json"), r#"[{"key": "Right"}]"#).unwrap();
        let toml_path = easy_dir.join("levels.toml");

        write_levels_metadata(&toml_path, "wrap.txt", None, None);
        let _cwd = CwdGuard::set(temp_dir.path());
        assert!(run_verify_all().is_err());
        assert_eq!(read_levels_toml(&toml_path).unwrap().level[0].solved, Some(false));

        let options = EngineOptions {
            fall_through: true,
            ..EngineOptions::default()
        };
        write_levels_metadata(&toml_path, "wrap.txt", None, Some(options));
        run_verify_all().unwrap();
        assert_eq!(read_levels_toml(&toml_path).unwrap().level[0].solved, Some(true));
    }
}
