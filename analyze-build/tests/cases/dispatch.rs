// SPDX-License-Identifier: GPL-3.0-or-later

use crate::fixtures::*;
use anyhow::Result;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::collections::HashSet;

#[test]
fn every_source_file_is_analyzed_once() -> Result<()> {
    let env = TestEnvironment::new("every_source_file_is_analyzed_once")?;
    env.create_source_files(&[("src/a.c", ""), ("src/b.c", ""), ("src/c.c", "")])?;
    env.create_compilation_database("build", &["src/a.c", "src/b.c", "src/c.c"])?;
    let analyzer = env.create_analyzer("analyzer", r#"echo "$file: checked""#)?;

    let result = env.run(&["--analyzer", analyzer.to_str().unwrap(), "-p", "build"])?;
    result.assert_success()?;

    let blocks = result.blocks();
    let counters: Vec<_> = blocks.iter().map(|block| block.counter.as_str()).collect();
    assert_eq!(vec!["1/3", "2/3", "3/3"], counters);

    let files: HashSet<_> = blocks.iter().map(|block| block.file.clone()).collect();
    let expected: HashSet<_> = ["src/a.c", "src/b.c", "src/c.c"]
        .iter()
        .map(|file| env.temp_dir().join(file).display().to_string())
        .collect();
    assert_eq!(expected, files);

    for block in &blocks {
        assert_eq!(vec![format!("{}: checked", block.file)], block.lines);
    }
    assert_eq!(3, env.analyzer_calls()?.len());
    Ok(())
}

#[test]
fn missing_and_duplicate_entries_are_skipped() -> Result<()> {
    let env = TestEnvironment::new("missing_and_duplicate_entries_are_skipped")?;
    env.create_source_files(&[("src/a.c", ""), ("src/b.c", "")])?;
    env.create_compilation_database("build", &["src/a.c", "src/generated.c", "src/a.c", "src/b.c"])?;
    let analyzer = env.create_analyzer("analyzer", "exit 0")?;

    let result = env.run(&["--analyzer", analyzer.to_str().unwrap(), "-p", "build", "-j", "1"])?;
    result.assert_success()?;

    let files: Vec<_> = result.blocks().into_iter().map(|block| block.file).collect();
    assert_eq!(
        vec![
            env.temp_dir().join("src/a.c").display().to_string(),
            env.temp_dir().join("src/b.c").display().to_string()
        ],
        files
    );
    Ok(())
}

#[test]
fn same_file_through_parent_directories_is_analyzed_once() -> Result<()> {
    let env = TestEnvironment::new("same_file_through_parent_directories_is_analyzed_once")?;
    env.create_source_files(&[("src/common.c", ""), ("build/lib1/.keep", ""), ("build/lib2/.keep", "")])?;
    let root = env.temp_dir();
    let entries = serde_json::json!([
        { "directory": root.join("build/lib1"), "file": "../../src/common.c", "command": "cc -c ../../src/common.c" },
        { "directory": root.join("build/lib2"), "file": "../../src/common.c", "command": "cc -c ../../src/common.c" },
        { "directory": root, "file": "src/common.c", "command": "cc -c src/common.c" },
    ]);
    std::fs::write(root.join("build/compile_commands.json"), entries.to_string())?;
    let analyzer = env.create_analyzer("analyzer", "exit 0")?;

    let result = env.run(&["--analyzer", analyzer.to_str().unwrap(), "-p", "build"])?;
    result.assert_success()?;

    let files: Vec<_> = result.blocks().into_iter().map(|block| block.file).collect();
    assert_eq!(vec![root.join("src/common.c").display().to_string()], files);
    assert_eq!(1, env.analyzer_calls()?.len());
    Ok(())
}

#[test]
fn analyzer_arguments_are_passed() -> Result<()> {
    let env = TestEnvironment::new("analyzer_arguments_are_passed")?;
    env.create_source_files(&[("src/a.c", "")])?;
    env.create_compilation_database("build", &["src/a.c"])?;
    let analyzer = env.create_analyzer("analyzer", "exit 0")?;

    let result = env.run(&[
        "--analyzer",
        analyzer.to_str().unwrap(),
        "-p",
        "build",
        "--debug",
        "--",
        "-checks=*",
        "-quiet",
    ])?;
    result.assert_success()?;

    let expected = format!(
        "-p {} -checks=* -quiet -debug {}",
        env.temp_dir().join("build").display(),
        env.temp_dir().join("src/a.c").display()
    );
    assert_eq!(vec![expected], env.analyzer_calls()?);
    Ok(())
}

#[test]
fn verbose_output_has_the_command_line() -> Result<()> {
    let env = TestEnvironment::new("verbose_output_has_the_command_line")?;
    env.create_source_files(&[("src/a.c", "")])?;
    env.create_compilation_database("build", &["src/a.c"])?;
    let analyzer = env.create_analyzer("analyzer", r#"echo "$file: checked""#)?;

    let result = env.run(&["--analyzer", analyzer.to_str().unwrap(), "-p", "build", "-v"])?;
    result.assert_success()?;

    let blocks = result.blocks();
    assert_eq!(1, blocks.len());
    let block = &blocks[0];
    assert_eq!(2, block.lines.len());
    assert!(block.lines[0].starts_with(analyzer.to_str().unwrap()), "{:?}", block.lines);
    assert!(block.lines[0].ends_with(&block.file), "{:?}", block.lines);
    assert_eq!(format!("{}: checked", block.file), block.lines[1]);
    Ok(())
}

#[test]
fn concurrent_analyzers_are_bounded() -> Result<()> {
    let env = TestEnvironment::new("concurrent_analyzers_are_bounded")?;
    let files = ["a.c", "b.c", "c.c", "d.c", "e.c", "f.c"];
    let sources: Vec<_> = files.iter().map(|file| (*file, "")).collect();
    env.create_source_files(&sources)?;
    env.create_compilation_database("build", &files)?;
    let analyzer = env.create_analyzer(
        "analyzer",
        r#"slots="$(dirname "$0")/slots"
mkdir -p "$slots"
touch "$slots/$$"
echo "running: $(ls "$slots" | wc -l)"
sleep 0.3
rm -f "$slots/$$""#,
    )?;

    let result = env.run(&["--analyzer", analyzer.to_str().unwrap(), "-p", "build", "-j", "2"])?;
    result.assert_success()?;

    let blocks = result.blocks();
    assert_eq!(6, blocks.len());
    let peak = blocks
        .iter()
        .flat_map(|block| block.lines.iter())
        .filter_map(|line| line.strip_prefix("running: "))
        .filter_map(|count| count.trim().parse::<usize>().ok())
        .max()
        .unwrap_or(0);
    assert!((1..=2).contains(&peak), "peak concurrency was {peak}");
    Ok(())
}

#[test]
fn output_blocks_are_not_interleaved() -> Result<()> {
    let env = TestEnvironment::new("output_blocks_are_not_interleaved")?;
    let files = ["a.c", "b.c", "c.c", "d.c", "e.c", "f.c", "g.c", "h.c"];
    let sources: Vec<_> = files.iter().map(|file| (*file, "")).collect();
    env.create_source_files(&sources)?;
    env.create_compilation_database("build", &files)?;
    let analyzer = env.create_analyzer(
        "analyzer",
        r#"i=0
while [ $i -lt 200 ]; do
  echo "$file: line $i"
  i=$((i+1))
done"#,
    )?;

    let result = env.run(&["--analyzer", analyzer.to_str().unwrap(), "-p", "build", "-j", "4"])?;
    result.assert_success()?;

    let blocks = result.blocks();
    assert_eq!(8, blocks.len());
    for block in blocks {
        assert_eq!(200, block.lines.len());
        for (index, line) in block.lines.iter().enumerate() {
            assert_eq!(&format!("{}: line {index}", block.file), line);
        }
    }
    Ok(())
}

#[test]
fn excluding_everything_runs_nothing() -> Result<()> {
    let env = TestEnvironment::new("excluding_everything_runs_nothing")?;
    env.create_source_files(&[("src/a.c", ""), ("src/b.c", ""), ("src/c.c", "")])?;
    env.create_compilation_database("build", &["src/a.c", "src/b.c", "src/c.c"])?;
    let analyzer = env.create_analyzer("analyzer", "exit 0")?;

    let result = env.run(&["--analyzer", analyzer.to_str().unwrap(), "-p", "build", "--exclude", r"\.c$"])?;
    result.assert_success()?;

    assert!(result.blocks().is_empty());
    assert!(env.analyzer_calls()?.is_empty());
    Ok(())
}

#[test]
fn report_is_written_into_file() -> Result<()> {
    let env = TestEnvironment::new("report_is_written_into_file")?;
    env.create_source_files(&[("src/a.c", ""), ("src/b.c", "")])?;
    env.create_compilation_database("build", &["src/a.c", "src/b.c"])?;
    let analyzer = env.create_analyzer("analyzer", r#"echo "$file: checked""#)?;

    let result = env.run(&["--analyzer", analyzer.to_str().unwrap(), "-p", "build", "-o", "report.txt"])?;
    result.assert_success()?;

    assert!(result.blocks().is_empty());
    let report = env.read_file("report.txt")?;
    assert_eq!(2, parse_blocks(&report).len());

    let temporary_files: Vec<_> =
        env.file_names()?.into_iter().filter(|name| name.starts_with(".analyze-build-")).collect();
    assert!(temporary_files.is_empty(), "{temporary_files:?}");
    Ok(())
}

#[test]
fn report_file_is_replaced() -> Result<()> {
    let env = TestEnvironment::new("report_file_is_replaced")?;
    env.create_source_files(&[("src/a.c", "")])?;
    env.create_compilation_database("build", &["src/a.c"])?;
    env.create_source_files(&[("out/report.txt", "previous content\n")])?;
    let analyzer = env.create_analyzer("analyzer", "exit 0")?;

    env.command(&["--analyzer", analyzer.to_str().unwrap(), "-p", "build", "-o", "out/report.txt"])
        .assert()
        .success();

    let report = assert_fs::fixture::ChildPath::new(env.temp_dir().join("out/report.txt"));
    report.assert(predicate::str::contains("previous content").not());
    report.assert(predicate::str::contains("[1/1] "));
    Ok(())
}
