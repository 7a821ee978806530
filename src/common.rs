// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use log::warn;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock time in seconds since the UNIX epoch, used to stamp chunks.
pub fn capture_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Requests SCHED_FIFO for the calling thread so device reads keep up with
/// the sensor's line rate.  Failure (usually missing CAP_SYS_NICE) is only
/// logged.
#[cfg(target_os = "linux")]
pub fn set_thread_priority() {
    let mut param = libc::sched_param { sched_priority: 10 };
    let pid = unsafe { libc::pthread_self() };
    let err = unsafe {
        libc::pthread_setschedparam(pid, libc::SCHED_FIFO, &mut param as *mut libc::sched_param)
    };
    if err != 0 {
        let err = std::io::Error::from_raw_os_error(err);
        warn!("unable to set reader real-time fifo scheduler: {}", err);
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_thread_priority() {}
