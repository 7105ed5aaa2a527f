//! Control thread scheduling setup.
//!
//! With the `rt` feature the control thread is promoted to `SCHED_FIFO`
//! so the tick period holds under load; without it every call is a no-op
//! and the loop runs under the normal scheduler (development machines,
//! CI). Failure to elevate is reported, not fatal: the loop still runs,
//! only with softer timing.

/// RT priority requested for the control thread.
#[cfg(feature = "rt")]
const CONTROL_THREAD_PRIORITY: libc::c_int = 80;

/// Promote the calling thread to the real-time scheduler.
#[cfg(feature = "rt")]
pub fn elevate_current_thread() -> Result<(), String> {
    let param = libc::sched_param {
        sched_priority: CONTROL_THREAD_PRIORITY,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(format!(
            "sched_setscheduler(SCHED_FIFO, {CONTROL_THREAD_PRIORITY}) failed: {err}"
        ));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
pub fn elevate_current_thread() -> Result<(), String> {
    Ok(()) // Normal scheduler in development builds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_rt_feature_is_a_noop() {
        #[cfg(not(feature = "rt"))]
        assert!(elevate_current_thread().is_ok());
    }
}
