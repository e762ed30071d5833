// SPDX-License-Identifier: GPL-3.0-or-later

use crate::fixtures::*;
use anyhow::Result;
use predicates::prelude::*;

fn setup(test_name: &str) -> Result<TestEnvironment> {
    let env = TestEnvironment::new(test_name)?;
    env.create_source_files(&[("src/main.c", ""), ("src/main_test.c", ""), ("third_party/zlib.c", "")])?;
    env.create_compilation_database("build", &["src/main.c", "src/main_test.c", "third_party/zlib.c"])?;
    env.create_analyzer("analyzer", "exit 0")?;
    Ok(env)
}

#[test]
fn config_from_current_directory() -> Result<()> {
    let env = setup("config_from_current_directory")?;
    env.create_config(
        "analyze-build.yml",
        r#"
schema: "1.0"

analyzer:
  path: ./analyzer
  arguments: ["-quiet"]

jobs: 1

sources:
  exclude: ["third_party"]
"#,
    )?;

    let result = env.run(&["-p", "build", "--exclude", "_test", "--", "-fix"])?;
    result.assert_success()?;

    let expected = format!(
        "-p {} -quiet -fix {}",
        env.temp_dir().join("build").display(),
        env.temp_dir().join("src/main.c").display()
    );
    assert_eq!(vec![expected], env.analyzer_calls()?);
    Ok(())
}

#[test]
fn config_from_explicit_file() -> Result<()> {
    let env = setup("config_from_explicit_file")?;
    let config = env.create_config(
        "custom.yml",
        r#"
schema: "1.0"
analyzer:
  path: ./analyzer
sources:
  include: ["/src/"]
"#,
    )?;

    let result = env.run(&["-c", config.to_str().unwrap(), "-p", "build", "-j", "1"])?;
    result.assert_success()?;

    let files: Vec<_> = result.blocks().into_iter().map(|block| block.file).collect();
    assert_eq!(
        vec![
            env.temp_dir().join("src/main.c").display().to_string(),
            env.temp_dir().join("src/main_test.c").display().to_string()
        ],
        files
    );
    Ok(())
}

#[test]
fn command_line_analyzer_overrides_config() -> Result<()> {
    let env = setup("command_line_analyzer_overrides_config")?;
    env.create_config("analyze-build.yml", "schema: \"1.0\"\nanalyzer:\n  path: ./no-such-analyzer\n")?;
    let analyzer = env.temp_dir().join("analyzer");

    let result = env.run(&["--analyzer", analyzer.to_str().unwrap(), "-p", "build"])?;
    result.assert_success()?;

    assert_eq!(3, env.analyzer_calls()?.len());
    Ok(())
}

#[test]
fn unsupported_schema_is_rejected() -> Result<()> {
    let env = setup("unsupported_schema_is_rejected")?;
    env.create_config("analyze-build.yml", "schema: \"2.0\"\n")?;

    env.command(&["-p", "build"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unsupported schema version"));

    assert!(env.analyzer_calls()?.is_empty());
    Ok(())
}

#[test]
fn invalid_config_is_rejected() -> Result<()> {
    let env = setup("invalid_config_is_rejected")?;
    env.create_config("analyze-build.yml", "schema: \"1.0\"\nsources:\n  exclude: [\"test\", \"test\"]\n")?;

    env.command(&["-p", "build"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration validation failed"));
    Ok(())
}
