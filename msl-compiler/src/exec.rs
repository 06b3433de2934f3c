// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Running external tools on intermediate files.

use crate::diagnostic::{CompileError, Level, Location, Output};
use std::{
    env,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    process::{self, Command},
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_FILE: AtomicU64 = AtomicU64::new(0);

/// A command that reads `$input` and writes `$output`.
///
/// Each instance owns two temporary files with unique names, which are removed when it's
/// dropped. A file that already existed at the input path is never overwritten or removed.
#[derive(Debug)]
pub struct ExternalCommand {
    input: PathBuf,
    output: PathBuf,
    created_input: bool,
}

impl ExternalCommand {
    /// Creates the paths of the temporary files. The extensions include the leading dot, if any.
    pub fn new(input_extension: &str, output_extension: &str) -> Self {
        ExternalCommand {
            input: temp_path(input_extension),
            output: temp_path(output_extension),
            created_input: false,
        }
    }

    #[inline]
    pub fn input_path(&self) -> &Path {
        &self.input
    }

    #[inline]
    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Runs `command` through the shell with `data` as the input file, and returns the contents
    /// of the output file.
    ///
    /// On failure, the text printed by the command is added as a note followed by an error with
    /// the exit code.
    pub fn execute(
        &mut self,
        output: &mut Output,
        location: &Location,
        command: &str,
        data: &[u8],
    ) -> Result<Vec<u8>, CompileError> {
        let written = if self.created_input {
            fs::write(&self.input, data)
        } else {
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.input)
                .and_then(|mut file| {
                    self.created_input = true;
                    file.write_all(data)
                })
        };

        written.map_err(|err| {
            output.error(
                location,
                format!("couldn't write '{}': {}", self.input.display(), err),
            )
        })?;

        // Stale output from a previous run must not be mistaken for a result.
        let _ = fs::remove_file(&self.output);

        let command = command
            .replace("$input", &quote(&self.input))
            .replace("$output", &quote(&self.output));

        log::debug!("running `{}`", command);

        let result = shell(&command).output().map_err(|err| {
            output.error(location, format!("couldn't run `{}`: {}", command, err))
        })?;

        if !result.status.success() {
            let mut text = String::from_utf8_lossy(&result.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&result.stderr));

            let text = text.trim_end();
            if !text.is_empty() {
                output.add_message(
                    Level::Info,
                    &*location.file,
                    location.line,
                    location.column,
                    false,
                    text,
                );
            }

            let code = match result.status.code() {
                Some(code) => code.to_string(),
                None => "none".to_owned(),
            };

            return Err(output.error(
                location,
                format!("`{}` failed with exit code {}", command, code),
            ));
        }

        fs::read(&self.output).map_err(|err| {
            output.error(
                location,
                format!("couldn't read the output of `{}`: {}", command, err),
            )
        })
    }
}

impl Drop for ExternalCommand {
    fn drop(&mut self) {
        if self.created_input {
            let _ = fs::remove_file(&self.input);
        }

        let _ = fs::remove_file(&self.output);
    }
}

fn temp_path(extension: &str) -> PathBuf {
    let index = NEXT_FILE.fetch_add(1, Ordering::Relaxed);

    env::temp_dir().join(format!("msl-{}-{}{}", process::id(), index, extension))
}

pub(crate) fn quote(path: &Path) -> String {
    format!("\"{}\"", path.display())
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut shell = Command::new("cmd");
    shell.arg("/C").arg(command);
    shell
}

#[cfg(not(windows))]
fn shell(command: &str) -> Command {
    let mut shell = Command::new("sh");
    shell.arg("-c").arg(command);
    shell
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_paths() {
        let first = ExternalCommand::new(".glsl", ".spv");
        let second = ExternalCommand::new(".glsl", ".spv");

        assert_ne!(first.input_path(), second.input_path());
        assert_ne!(first.input_path(), first.output_path());
        assert_eq!(first.input_path().extension().unwrap(), "glsl");
        assert_eq!(first.output_path().extension().unwrap(), "spv");
    }

    #[cfg(unix)]
    #[test]
    fn copy_through_shell() {
        let mut output = Output::new();
        let location = Location::new("test.msl", 1, 1);
        let mut command = ExternalCommand::new(".txt", ".txt");

        let result = command
            .execute(&mut output, &location, "tr a-z A-Z < $input > $output", b"shader")
            .unwrap();
        assert_eq!(result, b"SHADER");
        assert!(command.input_path().exists());

        let paths = (command.input_path().to_owned(), command.output_path().to_owned());
        drop(command);
        assert!(!paths.0.exists());
        assert!(!paths.1.exists());
    }

    #[cfg(unix)]
    #[test]
    fn failure() {
        let mut output = Output::new();
        let location = Location::new("test.msl", 4, 1);
        let mut command = ExternalCommand::new("", "");

        let err = command
            .execute(&mut output, &location, "echo broken; exit 3", b"")
            .unwrap_err();

        let messages = output.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].level, Level::Info);
        assert_eq!(messages[0].text, "broken");
        assert_eq!(err.message, 1);
        assert_eq!(
            messages[1].text,
            "`echo broken; exit 3` failed with exit code 3",
        );
        assert_eq!(output.error_count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn existing_input_is_kept() {
        let mut output = Output::new();
        let location = Location::new("test.msl", 2, 1);
        let mut command = ExternalCommand::new(".txt", ".txt");
        fs::write(command.input_path(), b"someone else's file").unwrap();

        let err = command
            .execute(&mut output, &location, "cp $input $output", b"shader")
            .unwrap_err();
        assert!(output
            .message(err.message)
            .unwrap()
            .text
            .starts_with("couldn't write"));

        let input = command.input_path().to_owned();
        drop(command);
        assert_eq!(fs::read(&input).unwrap(), b"someone else's file");
        fs::remove_file(&input).unwrap();
    }
}
