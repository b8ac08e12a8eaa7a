// Batched execution of a command over many file arguments.
//
// File arguments are split into chunks that fit the platform command-line
// limit; chunks run serially or in parallel and their results are folded into
// a single exit code and output buffer.

use crate::envcontext::ProcessEnvironment;
use crate::error::{HookExecutionError, Result, SnpError};
use crate::process::{ProcessConfig, ProcessManager};
use std::time::Duration;

/// Options for a batched run
#[derive(Debug, Clone)]
pub struct XargsOptions {
    /// Maximum number of chunks running at once
    pub jobs: usize,
    /// Override for the platform command-line limit
    pub max_length: Option<usize>,
    pub timeout: Option<Duration>,
}

impl Default for XargsOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            max_length: None,
            timeout: None,
        }
    }
}

impl XargsOptions {
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }
}

fn environ_size(env: &ProcessEnvironment) -> usize {
    // key=value plus NUL, plus the pointer slot
    env.vars()
        .iter()
        .map(|(k, v)| k.len() + v.len() + 2 + std::mem::size_of::<usize>())
        .sum()
}

/// Longest command line a single launch may use
#[cfg(unix)]
pub fn platform_max_length(env: &ProcessEnvironment) -> usize {
    // SAFETY: sysconf has no preconditions
    let arg_max = unsafe { libc::sysconf(libc::_SC_ARG_MAX) };
    let arg_max = if arg_max > 0 { arg_max as usize } else { 1 << 17 };
    arg_max
        .saturating_sub(2048)
        .saturating_sub(environ_size(env))
        .clamp(1 << 12, 1 << 17)
}

#[cfg(windows)]
pub fn platform_max_length(_env: &ProcessEnvironment) -> usize {
    // UNICODE_STRING limit minus headroom
    (1 << 15) - 2048
}

#[cfg(not(any(unix, windows)))]
pub fn platform_max_length(_env: &ProcessEnvironment) -> usize {
    1 << 12
}

/// Length of the arguments joined by spaces, as the OS counts it
pub fn command_length<S: AsRef<str>>(args: &[S]) -> usize {
    let joined_len: usize = if cfg!(windows) {
        args.iter().map(|a| a.as_ref().encode_utf16().count()).sum()
    } else {
        args.iter().map(|a| a.as_ref().len()).sum()
    };
    joined_len + args.len().saturating_sub(1)
}

/// Split `varargs` into command lines that each start with `cmd`.
///
/// Chunks hold at most `max(4, ceil(n / target_concurrency))` arguments so
/// parallel runs get comparable work, and never exceed `max_length`. Argument
/// order is preserved. An empty `varargs` yields a single bare command.
pub fn partition(
    cmd: &[String],
    varargs: &[String],
    target_concurrency: usize,
    max_length: usize,
) -> Result<Vec<Vec<String>>> {
    let target_concurrency = target_concurrency.max(1);
    let max_args = varargs.len().div_ceil(target_concurrency).max(4);
    let base_length = command_length(cmd) + 1;

    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut total_length = base_length;

    for arg in varargs {
        let arg_length = command_length(&[arg]) + 1;

        if total_length + arg_length > max_length || current.len() >= max_args {
            if current.is_empty() {
                return Err(SnpError::HookExecution(Box::new(
                    HookExecutionError::ArgumentTooLong {
                        argument: arg.clone(),
                        length: arg_length,
                        max_length,
                    },
                )));
            }
            chunks.push(cmd.iter().cloned().chain(current.drain(..)).collect());
            total_length = base_length;
        }

        if total_length + arg_length > max_length {
            return Err(SnpError::HookExecution(Box::new(
                HookExecutionError::ArgumentTooLong {
                    argument: arg.clone(),
                    length: arg_length,
                    max_length,
                },
            )));
        }

        current.push(arg.clone());
        total_length += arg_length;
    }

    chunks.push(cmd.iter().cloned().chain(current).collect());
    Ok(chunks)
}

/// Fold one chunk's exit code into the running result; any failure sticks
pub fn aggregate_return_code(acc: i32, code: i32) -> i32 {
    match (acc, code) {
        (0, code) => code,
        (acc, 0) => acc,
        (acc, code) => acc.max(code),
    }
}

/// Run `cmd` once per chunk of `varargs`, returning the aggregate exit code
/// and the concatenated output of every chunk in order.
///
/// A missing executable is reported as exit code 1 with a message, like any
/// other failing command.
pub async fn run_xargs(
    cmd: &[String],
    varargs: &[String],
    env: &ProcessEnvironment,
    options: &XargsOptions,
) -> Result<(i32, Vec<u8>)> {
    let Some(program) = cmd.first() else {
        return Ok((1, b"Empty command".to_vec()));
    };

    let probe = ProcessConfig::new(program.clone()).with_process_environment(env);
    let resolved = match probe.resolve_executable() {
        Ok(path) => path.to_string_lossy().into_owned(),
        Err(_) => {
            return Ok((1, format!("Executable `{program}` not found").into_bytes()));
        }
    };

    let mut cmd = cmd.to_vec();
    cmd[0] = resolved;

    let max_length = options
        .max_length
        .unwrap_or_else(|| platform_max_length(env));
    let chunks = partition(&cmd, varargs, options.jobs, max_length)?;

    tracing::debug!(
        command = %cmd.join(" "),
        files = varargs.len(),
        chunks = chunks.len(),
        jobs = options.jobs,
        "Running batched command"
    );

    let configs = chunks
        .iter()
        .map(|argv| {
            let mut config = ProcessConfig::from_argv(argv)
                .with_process_environment(env)
                .with_merged_output();
            config.timeout = options.timeout;
            config
        })
        .collect();

    let manager = ProcessManager::with_config(options.jobs, options.timeout);
    let mut return_code = 0;
    let mut output = Vec::new();

    for result in manager.execute_parallel(configs).await {
        let result = result?;
        return_code = aggregate_return_code(return_code, result.return_code());
        output.extend(result.combined_output());
    }

    Ok((return_code, output))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_command_length() {
        assert_eq!(command_length(&["a", "bc"]), 4);
        assert_eq!(command_length::<&str>(&[]), 0);
    }

    #[test]
    fn test_partition_empty_varargs_runs_once() {
        let cmd = strings(&["pixi", "run"]);
        let chunks = partition(&cmd, &[], 1, 4096).unwrap();
        assert_eq!(chunks, vec![cmd]);
    }

    #[test]
    fn test_partition_single_chunk() {
        let cmd = strings(&["foo"]);
        let files = strings(&["a", "b", "c"]);
        let chunks = partition(&cmd, &files, 1, 4096).unwrap();
        assert_eq!(chunks, vec![strings(&["foo", "a", "b", "c"])]);
    }

    #[test]
    fn test_partition_respects_max_length() {
        let cmd = strings(&["ninechars"]);
        let files = strings(&["a", "b", "c", "d"]);
        // "ninechars" + 1 = 10, each arg costs 2
        let chunks = partition(&cmd, &files, 1, 14).unwrap();
        assert_eq!(
            chunks,
            vec![
                strings(&["ninechars", "a", "b"]),
                strings(&["ninechars", "c", "d"])
            ]
        );
        for chunk in &chunks {
            assert!(command_length(chunk) < 14);
        }
    }

    #[test]
    fn test_partition_spreads_work_for_concurrency() {
        let cmd = strings(&["foo"]);
        let files: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        let chunks = partition(&cmd, &files, 2, 4096).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 6);
        assert_eq!(chunks[1].len(), 6);

        let flattened: Vec<String> = chunks.iter().flat_map(|c| c[1..].to_vec()).collect();
        assert_eq!(flattened, files);
    }

    #[test]
    fn test_partition_small_batches_not_split_below_four() {
        let cmd = strings(&["foo"]);
        let files = strings(&["a", "b", "c"]);
        let chunks = partition(&cmd, &files, 8, 4096).unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_partition_argument_too_long() {
        let cmd = strings(&["foo"]);
        let files = vec!["x".repeat(100)];
        let err = partition(&cmd, &files, 1, 50).unwrap_err();
        assert!(matches!(
            err,
            SnpError::HookExecution(ref e)
                if matches!(e.as_ref(), HookExecutionError::ArgumentTooLong { .. })
        ));
    }

    #[test]
    fn test_aggregate_return_code() {
        assert_eq!(aggregate_return_code(0, 0), 0);
        assert_eq!(aggregate_return_code(0, 2), 2);
        assert_eq!(aggregate_return_code(3, 0), 3);
        assert_eq!(aggregate_return_code(1, 5), 5);
        assert_ne!(aggregate_return_code(0, -9), 0);
        assert_ne!(aggregate_return_code(-9, 0), 0);
    }

    #[test]
    fn test_platform_max_length_bounds() {
        let env = ProcessEnvironment::inherit_system();
        let max = platform_max_length(&env);
        assert!(max >= 1 << 12);
        assert!(max <= 1 << 17);
    }

    #[tokio::test]
    async fn test_run_xargs_missing_executable() {
        let env = ProcessEnvironment::from_vars([("PATH", "/definitely/not/here")]);
        let (code, output) = run_xargs(
            &strings(&["no-such-tool-12345"]),
            &[],
            &env,
            &XargsOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(code, 1);
        assert_eq!(output, b"Executable `no-such-tool-12345` not found");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_xargs_concatenates_chunks_in_order() {
        let env = ProcessEnvironment::inherit_system();
        let files: Vec<String> = (0..8).map(|i| format!("f{i}")).collect();
        let options = XargsOptions::default().with_jobs(4).with_max_length(4096);

        let (code, output) = run_xargs(&strings(&["echo"]), &files, &env, &options)
            .await
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "f0 f1 f2 f3\nf4 f5 f6 f7\n"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_xargs_interleaves_streams_in_write_order() {
        let env = ProcessEnvironment::inherit_system();
        let cmd = strings(&["sh", "-c", "echo first >&2; echo second"]);

        let (code, output) = run_xargs(&cmd, &[], &env, &XargsOptions::default())
            .await
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(String::from_utf8(output).unwrap(), "first\nsecond\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_xargs_failure_in_any_chunk() {
        let env = ProcessEnvironment::inherit_system();
        let files = strings(&["ok1", "ok2", "ok3", "ok4", "bad", "ok5"]);
        let script = "for f in \"$@\"; do [ \"$f\" = bad ] && exit 7; done; exit 0";
        let cmd = strings(&["sh", "-c", script, "--"]);
        let options = XargsOptions::default().with_jobs(2).with_max_length(4096);

        let (code, _) = run_xargs(&cmd, &files, &env, &options).await.unwrap();
        assert_eq!(code, 7);
    }
}
