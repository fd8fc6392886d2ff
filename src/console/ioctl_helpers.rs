//! Thin wrappers for console ioctl calls
//!
//! Keeps the unsafe `libc::ioctl` calls in one place and turns the
//! `-1`/errno convention into `nix::Result`.

use log::trace;
use nix::errno::Errno;
use std::os::unix::io::RawFd;

/// Execute an ioctl command that writes an `int` through its argument.
///
/// # Arguments
/// * `fd` - File descriptor
/// * `cmd` - ioctl command number
/// * `cmd_name` - Human-readable name for log messages
pub fn ioctl_read_int(fd: RawFd, cmd: libc::c_ulong, cmd_name: &str) -> nix::Result<libc::c_int> {
    let mut value: libc::c_int = 0;
    let ret = unsafe { libc::ioctl(fd, cmd, &mut value as *mut libc::c_int) };
    match Errno::result(ret) {
        Ok(_) => Ok(value),
        Err(e) => {
            trace!("{} failed on fd {}: {}", cmd_name, fd, e);
            Err(e)
        }
    }
}

/// Execute an ioctl command that writes a single byte through its argument.
pub fn ioctl_read_byte(fd: RawFd, cmd: libc::c_ulong, cmd_name: &str) -> nix::Result<u8> {
    let mut value: libc::c_uchar = 0;
    let ret = unsafe { libc::ioctl(fd, cmd, &mut value as *mut libc::c_uchar) };
    match Errno::result(ret) {
        Ok(_) => Ok(value),
        Err(e) => {
            trace!("{} failed on fd {}: {}", cmd_name, fd, e);
            Err(e)
        }
    }
}

/// Execute an ioctl command that takes an integer by value.
///
/// # Arguments
/// * `fd` - File descriptor
/// * `cmd` - ioctl command number
/// * `arg` - Integer argument
/// * `cmd_name` - Human-readable name for log messages
pub fn ioctl_with_int_arg(
    fd: RawFd,
    cmd: libc::c_ulong,
    arg: libc::c_int,
    cmd_name: &str,
) -> nix::Result<()> {
    let ret = unsafe { libc::ioctl(fd, cmd, arg as libc::c_ulong) };
    match Errno::result(ret) {
        Ok(_) => Ok(()),
        Err(e) => {
            trace!("{}({}) failed on fd {}: {}", cmd_name, arg, fd, e);
            Err(e)
        }
    }
}
