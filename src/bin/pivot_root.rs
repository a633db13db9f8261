//! Change the root file system.
//!
//! Moves the current root to `put_old` and makes `new_root` the new
//! root, via the `pivot_root(2)` syscall. Exits 0 on success, 1 with a
//! diagnostic on stderr otherwise.

use std::env;
use std::ffi::CString;
use std::io;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        eprintln!("usage: {} new_root put_old", args[0]);
        process::exit(1);
    }

    let new_root = match CString::new(args[1].as_str()) {
        Ok(s) => s,
        Err(_) => {
            eprintln!("pivot_root: bad new_root argument");
            process::exit(1);
        }
    };
    let put_old = match CString::new(args[2].as_str()) {
        Ok(s) => s,
        Err(_) => {
            eprintln!("pivot_root: bad put_old argument");
            process::exit(1);
        }
    };

    let rc = unsafe {
        libc::syscall(
            libc::SYS_pivot_root,
            new_root.as_ptr(),
            put_old.as_ptr(),
        )
    };
    if rc < 0 {
        eprintln!("pivot_root: {}", io::Error::last_os_error());
        process::exit(1);
    }
}
