//! Encapsulates how the engine and runtime log, wrapping the `log` facade
//! rather than printing directly so a consuming binary picks the sink
//! (`env_logger` in `qp_demo`; nothing in `qp_core` itself).
use log::Level;

#[derive(Clone, Copy, Debug, Default)]
pub struct HSMLogger;

impl HSMLogger {
    pub(crate) fn log_trace(&self, function_logging: &str, msg: &str) {
        self.log_msg(Level::Trace, function_logging, msg)
    }

    pub(crate) fn log_debug(&self, function_logging: &str, msg: &str) {
        self.log_msg(Level::Debug, function_logging, msg)
    }

    #[allow(dead_code)]
    pub(crate) fn log_info(&self, function_logging: &str, msg: &str) {
        self.log_msg(Level::Info, function_logging, msg)
    }

    pub(crate) fn log_error(&self, function_logging: &str, msg: &str) {
        self.log_msg(Level::Error, function_logging, msg)
    }

    fn log_msg(&self, level: Level, function_logging: &str, msg: &str) {
        log::log!(level, "[{function_logging}] {msg}");
    }
}
