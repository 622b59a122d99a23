use crate::models::EngineOptions;
use crate::state::GameState;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_DIFFICULTIES: [&str; 3] = ["easy", "medium", "hard"];
pub const LEVEL_EXTENSION: &str = "txt";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LevelsToml {
    #[serde(default)]
    pub level: Vec<LevelMeta>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LevelMeta {
    pub id: Option<String>,
    pub file: Option<String>,
    pub author: Option<String>,
    pub solved: Option<bool>,
    pub difficulty: Option<String>,
    pub tags: Option<Vec<String>>,
    pub description: Option<String>,
    /// Rule switches for this level; absent means all off.
    pub options: Option<EngineOptions>,
}

/// Reads and parses a level text file.
pub fn load_level(level_path: &Path) -> Result<GameState> {
    let contents = fs::read_to_string(level_path)
        .with_context(|| format!("Failed to read level file: {}", level_path.display()))?;
    let state = GameState::parse(&contents)
        .with_context(|| format!("Failed to parse level text: {}", level_path.display()))?;
    Ok(state)
}

/// Engine options recorded for `level_path` in its sibling `levels.toml`.
pub fn options_for_level(level_path: &Path) -> Result<EngineOptions> {
    let levels_toml_path = levels_toml_path_for(level_path);
    if !levels_toml_path.exists() {
        return Ok(EngineOptions::default());
    }

    let levels_toml = read_levels_toml(&levels_toml_path)?;
    let file_name = level_file_name(level_path)?;
    let options = levels_toml
        .level
        .iter()
        .find(|entry| entry.file.as_deref() == Some(file_name))
        .and_then(|entry| entry.options)
        .unwrap_or_default();
    Ok(options)
}

pub fn update_solved_status(level_path: &Path, solved: bool) -> Result<()> {
    let levels_toml_path = levels_toml_path_for(level_path);
    if !levels_toml_path.exists() {
        return Ok(());
    }

    let mut levels_toml = read_levels_toml(&levels_toml_path)?;
    let file_name = level_file_name(level_path)?;

    let Some(entry) = levels_toml
        .level
        .iter_mut()
        .find(|entry| entry.file.as_deref() == Some(file_name))
    else {
        return Ok(());
    };
    if entry.solved == Some(solved) {
        return Ok(());
    }
    entry.solved = Some(solved);

    write_levels_toml(&levels_toml_path, &levels_toml)
}

fn level_file_name(level_path: &Path) -> Result<&str> {
    level_path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow::anyhow!("Level path has no valid filename"))
}

pub fn levels_toml_path_for(level_path: &Path) -> PathBuf {
    level_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("levels.toml")
}

pub fn read_levels_toml(path: &Path) -> Result<LevelsToml> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let levels_toml: LevelsToml =
        toml::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(levels_toml)
}

pub fn write_levels_toml(path: &Path, levels_toml: &LevelsToml) -> Result<()> {
    let output = toml::to_string_pretty(levels_toml)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    fs::write(path, output).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn find_levels_root() -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let direct = cwd.join("levels");
    if direct.is_dir() {
        return Ok(direct);
    }

    let nested = cwd.join("snakefall").join("levels");
    if nested.is_dir() {
        return Ok(nested);
    }

    bail!(
        "Could not find levels directory. Expected ./levels or ./snakefall/levels from {}",
        cwd.display()
    )
}

/// Difficulty folders to visit: the requested one, or all defaults.
pub fn selected_difficulties(filter: Option<&str>) -> Result<Vec<&'static str>> {
    match filter {
        None => Ok(DEFAULT_DIFFICULTIES.to_vec()),
        Some(wanted) => {
            let wanted = wanted.trim().to_lowercase();
            match DEFAULT_DIFFICULTIES.iter().find(|name| **name == wanted) {
                Some(name) => Ok(vec![*name]),
                None => bail!(
                    "Unknown difficulty '{wanted}'. Expected one of: {}",
                    DEFAULT_DIFFICULTIES.join(", ")
                ),
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const METADATA: &str = r#"
[[level]]
id = "ledge"
file = "ledge.txt"
solved = false

[level.options]
fall_through = true

[[level]]
id = "plain"
file = "plain.txt"
"#;

    #[test]
    fn test_options_for_level_reads_options_table() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("levels.toml"), METADATA).unwrap();

        let options = options_for_level(&temp_dir.path().join("ledge.txt")).unwrap();
        assert!(options.fall_through);
        assert!(!options.allow_tail_biting);

        let options = options_for_level(&temp_dir.path().join("plain.txt")).unwrap();
        assert_eq!(options, EngineOptions::default());
    }

    #[test]
    fn test_options_for_level_without_metadata_file() {
        let temp_dir = TempDir::new().unwrap();
        let options = options_for_level(&temp_dir.path().join("anything.txt")).unwrap();
        assert_eq!(options, EngineOptions::default());
    }

    #[test]
    fn test_update_solved_status_keeps_options() {
        let temp_dir = TempDir::new().unwrap();
        let toml_path = temp_dir.path().join("levels.toml");
        fs::write(&toml_path, METADATA).unwrap();

        update_solved_status(&temp_dir.path().join("ledge.txt"), true).unwrap();

        let updated = read_levels_toml(&toml_path).unwrap();
        assert_eq!(updated.level[0].solved, Some(true));
        assert_eq!(updated.level[0].options.map(|o| o.fall_through), Some(true));
        assert_eq!(updated.level[1].solved, None);
    }

    #[test]
    fn test_update_solved_status_ignores_unlisted_level() {
        let temp_dir = TempDir::new().unwrap();
        let toml_path = temp_dir.path().join("levels.toml");
        fs::write(&toml_path, METADATA).unwrap();

        update_solved_status(&temp_dir.path().join("other.txt"), true).unwrap();
        assert_eq!(fs::read_to_string(&toml_path).unwrap(), METADATA);
    }

    #[test]
    fn test_load_level_reports_parse_context() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.txt");
        fs::write(&path, "R..\n#%.\n..X").unwrap();

        let error = load_level(&path).unwrap_err();
        let message = format!("{error:#}");
        assert!(message.contains("Failed to parse level text"));
        assert!(message.contains('%'));
    }

    #[test]
    fn test_selected_difficulties() {
        assert_eq!(selected_difficulties(None).unwrap().len(), 3);
        assert_eq!(selected_difficulties(Some("Hard")).unwrap(), vec!["hard"]);
        assert!(selected_difficulties(Some("brutal")).is_err());
    }

    #[test]
    fn test_find_levels_root_falls_back_to_nested_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("snakefall/levels")).unwrap();
        let _cwd = crate::test_cwd::CwdGuard::set(temp_dir.path());

        let root = find_levels_root().unwrap();
        assert!(root.ends_with("snakefall/levels"));
    }

    #[test]
    fn test_find_levels_root_reports_both_candidates() {
        let temp_dir = TempDir::new().unwrap();
        let _cwd = crate::test_cwd::CwdGuard::set(temp_dir.path());

        let error = find_levels_root().unwrap_err();
        assert!(error.to_string().contains("./snakefall/levels"));
    }
}
