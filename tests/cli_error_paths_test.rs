use snakefall::levels::{read_levels_toml, write_levels_toml, LevelMeta, LevelsToml};
use std::{fs, path::Path, process::Command};
use tempfile::TempDir;

const WALK_RIGHT: &str = ">R...X\n######";

fn write_level(path: &Path, text: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn create_level_meta(file: Option<&str>, solved: Option<bool>, difficulty: &str) -> LevelMeta {
    LevelMeta {
        id: Some("cli-test-level".to_string()),
        file: file.map(ToString::to_string),
        author: Some("snakefall".to_string()),
        solved,
        difficulty: Some(difficulty.to_string()),
        tags: Some(vec![]),
        description: Some("CLI test level".to_string()),
        options: None,
    }
}

fn write_levels_metadata_entries(levels_toml_path: &Path, entries: Vec<LevelMeta>) {
    let levels_toml = LevelsToml { level: entries };
    write_levels_toml(levels_toml_path, &levels_toml).unwrap();
}

fn run_snakefall(current_dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_snakefall"))
        .args(args)
        .current_dir(current_dir)
        .output()
        .expect("failed to run snakefall binary")
}

#[test]
fn test_solve_command_writes_playback_that_verifies() {
    let temp_dir = TempDir::new().unwrap();
    write_level(&temp_dir.path().join("levels/easy/walk.txt"), WALK_RIGHT);
    let easy_dir = temp_dir.path().join("levels/easy");
    write_levels_metadata_entries(
        &easy_dir.join("levels.toml"),
        vec![create_level_meta(Some("walk.txt"), Some(false), "easy")],
    );

    let output = run_snakefall(
        temp_dir.path(),
        &[
            "solve",
            "levels/easy/walk.txt",
            "--output",
            "playbacks/easy/walk.json",
        ],
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "solve failed: {stdout}");
    assert!(stdout.contains("Outcome: solution found"));
    assert!(stdout.contains("Solution length: 4"));
    assert!(temp_dir.path().join("playbacks/easy/walk.json").exists());

    let output = run_snakefall(temp_dir.path(), &["verify", "levels/easy/walk.txt"]);
    assert!(output.status.success());
    let updated = read_levels_toml(&easy_dir.join("levels.toml")).unwrap();
    assert_eq!(updated.level[0].solved, Some(true));
}

#[test]
fn test_solve_command_fails_for_unsolvable_level() {
    let temp_dir = TempDir::new().unwrap();
    write_level(&temp_dir.path().join("stuck.txt"), "#####\n#>R##\n#####\n...X.");

    let output = run_snakefall(temp_dir.path(), &["solve", "stuck.txt"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout.contains("Outcome: not possible"));
    assert!(stderr.contains("No solution found"));
}

#[test]
fn test_solve_command_honours_rule_flags() {
    let temp_dir = TempDir::new().unwrap();
    write_level(&temp_dir.path().join("wrap.txt"), "X.>R\n####");

    let output = run_snakefall(temp_dir.path(), &["solve", "wrap.txt", "--max-depth", "3"]);
    assert_eq!(output.status.code(), Some(1));

    let output = run_snakefall(temp_dir.path(), &["solve", "wrap.txt", "--fall-through"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("Solution length: 1"));
}

#[test]
fn test_solve_command_reports_malformed_level() {
    let temp_dir = TempDir::new().unwrap();
    write_level(&temp_dir.path().join("bad.txt"), "R.\n#%\n.X");

    let output = run_snakefall(temp_dir.path(), &["solve", "bad.txt"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Failed to parse level text"));
    assert!(stderr.contains("Malformed character '%'"));
}

#[test]
fn test_replay_command_prints_each_state() {
    let temp_dir = TempDir::new().unwrap();
    write_level(&temp_dir.path().join("walk.txt"), WALK_RIGHT);
    fs::write(
        temp_dir.path().join("walk.json"),
        r#"[{"key": "R"}, {"key": "R"}]"#,
    )
    .unwrap();

    let output = run_snakefall(temp_dir.path(), &["replay", "walk.txt", "walk.json"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("-- state 0 --"));
    assert!(stdout.contains("-- state 2 --"));
    assert!(!stdout.contains("-- state 3 --"));
}

#[test]
fn test_verify_command_returns_error_for_uninferrable_playback_path() {
    let temp_dir = TempDir::new().unwrap();
    write_level(&temp_dir.path().join("custom/easy/level.txt"), WALK_RIGHT);

    let output = run_snakefall(temp_dir.path(), &["verify", "custom/easy/level.txt"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Failed to resolve playback path"));
    assert!(stderr.contains("Unable to infer playback path"));
}

#[test]
fn test_verify_command_returns_error_for_malformed_playback_file() {
    let temp_dir = TempDir::new().unwrap();
    write_level(&temp_dir.path().join("levels/easy/level.txt"), WALK_RIGHT);
    write_level(
        &temp_dir.path().join("playbacks/easy/level.json"),
        "{malformed-json}",
    );

    let output = run_snakefall(temp_dir.path(), &["verify", "levels/easy/level.txt"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Failed to load playback"));
    assert!(stderr.contains("Failed to parse playback JSON"));
}

#[test]
fn test_verify_all_command_returns_error_for_missing_level_file() {
    let temp_dir = TempDir::new().unwrap();
    let easy_dir = temp_dir.path().join("levels/easy");
    fs::create_dir_all(&easy_dir).unwrap();
    write_levels_metadata_entries(
        &easy_dir.join("levels.toml"),
        vec![create_level_meta(Some("missing.txt"), Some(true), "easy")],
    );

    let output = run_snakefall(temp_dir.path(), &["verify-all"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Level file not found"));
}

#[test]
fn test_generate_playbacks_rejects_unknown_difficulty() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir_all(temp_dir.path().join("levels/easy")).unwrap();

    let output = run_snakefall(
        temp_dir.path(),
        &["generate-playbacks", "--difficulty", "brutal"],
    );
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Unknown difficulty 'brutal'"));
}

#[test]
fn test_validate_levels_toml_reports_aggregated_errors() {
    let temp_dir = TempDir::new().unwrap();
    let levels_root = temp_dir.path().join("levels");

    let easy_dir = levels_root.join("easy");
    write_level(&easy_dir.join("invalid.txt"), "no target");
    write_levels_metadata_entries(
        &easy_dir.join("levels.toml"),
        vec![
            create_level_meta(Some("missing.txt"), Some(true), "easy"),
            create_level_meta(Some("invalid.txt"), Some(true), "easy"),
        ],
    );

    for difficulty in ["medium", "hard"] {
        let dir = levels_root.join(difficulty);
        write_level(&dir.join("walk.txt"), WALK_RIGHT);
        write_levels_metadata_entries(
            &dir.join("levels.toml"),
            vec![create_level_meta(Some("walk.txt"), Some(true), difficulty)],
        );
    }

    let output = run_snakefall(temp_dir.path(), &["validate-levels-toml"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(3));
    assert!(stderr.contains("Validation failed with 2 issue(s):"));
    assert!(stderr.contains("1. [io] Referenced level file does not exist"));
    assert!(stderr.contains("2. [parse] Failed to parse level text"));
}
