//! Child-process execution with timeout and bounded output capture.

use super::{ExecOutput, Invocation};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Output cap per stream.
pub(crate) const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Grace period between SIGTERM and SIGKILL.
const SIGTERM_GRACE_MS: u64 = 500;

const CHUNK_SIZE: usize = 8192;

/// Build the `Command` for an invocation.
fn build_command(invocation: &Invocation) -> Command {
    let mut command = match invocation {
        Invocation::Argv { program, args } => {
            let mut c = Command::new(program);
            c.args(args);
            c
        }
        Invocation::Shell(line) => shell_command(line),
    };
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    command
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
    use std::os::windows::process::CommandExt;
    let mut c = Command::new("cmd");
    // Quoting was already done by the caller; cmd must see it untouched.
    c.arg("/C").raw_arg(line);
    c
}

#[cfg(not(windows))]
fn shell_command(line: &str) -> Command {
    let mut c = Command::new("sh");
    c.arg("-c").arg(line);
    c
}

/// Spawn and wait. `Err` only when the process cannot be started.
pub(crate) fn run(invocation: &Invocation, timeout: Option<Duration>) -> std::io::Result<ExecOutput> {
    let mut child = build_command(invocation).spawn()?;
    trace!(pid = child.id(), command = %invocation.render(), "spawned");
    let deadline = timeout.map(|t| Instant::now() + t);
    execute_with_deadline(&mut child, deadline)
}

fn execute_with_deadline(child: &mut Child, deadline: Option<Instant>) -> std::io::Result<ExecOutput> {
    let mut stdout_buf = Vec::with_capacity(CHUNK_SIZE);
    let mut stderr_buf = Vec::with_capacity(CHUNK_SIZE);
    let mut truncated = false;

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut chunk = vec![0u8; CHUNK_SIZE];

    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            warn!(pid = child.id(), "command timed out, terminating");
            kill_with_grace(child);
            let status = child.wait().ok();
            return Ok(ExecOutput {
                rc: status.and_then(|s| s.code()),
                stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
                stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
                timed_out: true,
            });
        }

        let mut did_read = false;
        if let Some(out) = stdout.as_mut() {
            if let Ok(n) = try_read_nonblocking(out, &mut chunk) {
                did_read |= n > 0;
                append_bounded(&mut stdout_buf, &chunk[..n], &mut truncated);
            }
        }
        if let Some(err) = stderr.as_mut() {
            if let Ok(n) = try_read_nonblocking(err, &mut chunk) {
                did_read |= n > 0;
                append_bounded(&mut stderr_buf, &chunk[..n], &mut truncated);
            }
        }

        match child.try_wait()? {
            Some(status) => {
                if let Some(out) = stdout.as_mut() {
                    let _ = drain_to_limit(out, &mut stdout_buf, &mut truncated);
                }
                if let Some(err) = stderr.as_mut() {
                    let _ = drain_to_limit(err, &mut stderr_buf, &mut truncated);
                }
                if truncated {
                    debug!(limit = MAX_OUTPUT_BYTES, "command output truncated");
                }
                return Ok(ExecOutput {
                    rc: status.code(),
                    stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
                    timed_out: false,
                });
            }
            None if !did_read => thread::sleep(Duration::from_millis(10)),
            None => {}
        }
    }
}

fn append_bounded(buf: &mut Vec<u8>, data: &[u8], truncated: &mut bool) {
    let space = MAX_OUTPUT_BYTES.saturating_sub(buf.len());
    if data.len() > space {
        *truncated = true;
    }
    buf.extend_from_slice(&data[..data.len().min(space)]);
}

/// Drain what is immediately available. A grandchild may still hold the pipe
/// open after the direct child exits, so this never blocks on Unix.
#[cfg(unix)]
fn drain_to_limit<R: Read + std::os::unix::io::AsRawFd>(
    stream: &mut R,
    buf: &mut Vec<u8>,
    truncated: &mut bool,
) -> std::io::Result<()> {
    let mut chunk = vec![0u8; CHUNK_SIZE];
    while !*truncated {
        match try_read_nonblocking(stream, &mut chunk)? {
            0 => break,
            n => append_bounded(buf, &chunk[..n], truncated),
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn drain_to_limit(stream: &mut impl Read, buf: &mut Vec<u8>, truncated: &mut bool) -> std::io::Result<()> {
    let mut chunk = vec![0u8; CHUNK_SIZE];
    while !*truncated {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        append_bounded(buf, &chunk[..n], truncated);
    }
    Ok(())
}

/// SIGTERM, then SIGKILL after the grace period.
#[cfg(unix)]
fn kill_with_grace(child: &mut Child) {
    let pid = child.id() as i32;
    // SAFETY: pid belongs to a child we spawned and have not reaped.
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
    thread::sleep(Duration::from_millis(SIGTERM_GRACE_MS));
    if let Ok(None) = child.try_wait() {
        warn!(pid, "process ignored SIGTERM, sending SIGKILL");
        // SAFETY: as above.
        unsafe {
            libc::kill(pid, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_with_grace(child: &mut Child) {
    let _ = child.kill();
}

/// Read without blocking. `Ok(0)` when nothing is available.
#[cfg(unix)]
fn try_read_nonblocking<R: Read + std::os::unix::io::AsRawFd>(
    stream: &mut R,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    let fd = stream.as_raw_fd();

    // SAFETY: fd is a valid pipe descriptor owned by `stream`.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    let was_nonblocking = (flags & libc::O_NONBLOCK) != 0;
    if !was_nonblocking {
        // SAFETY: as above.
        if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    let result = stream.read(buf);

    if !was_nonblocking {
        // SAFETY: as above.
        unsafe {
            libc::fcntl(fd, libc::F_SETFL, flags);
        }
    }

    match result {
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
        other => other,
    }
}

#[cfg(not(unix))]
fn try_read_nonblocking<R: Read>(stream: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    stream.read(buf)
}
