//! JVM telemetry for the Keycloak process under load.
//!
//! The monitor finds the single Keycloak JVM on the host, then samples
//! `jmap -histo:live` and `jcmd GC.heap_info` on a fixed interval and prints
//! instance counts of a few session/LDAP classes plus the used heap.

mod inspect;
mod monitor;
mod parse;
mod target;
pub mod testing;

pub use inspect::{JdkTools, JvmProcess, ProcessInspector};
pub use monitor::{Monitor, MonitorSettings, Sample};
pub use parse::{class_filter, kb_to_mb, parse_heap_used_kb, parse_histogram, ClassCount};
pub use target::{select_target, signature_pattern, TargetError};
