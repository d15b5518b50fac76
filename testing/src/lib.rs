//! Shared fixtures for the integration tests and benchmarks.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use safehtml::{Environment, Result, State, Template, Value};

pub fn template_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("templates")
        .join(name)
}

/// Compiles `templates/{name}` with the default environment.
pub fn load(name: &str) -> Result<Template> {
    Environment::new().compile_file(template_path(name))
}

/// An environment with a `record(x)` function that appends `x` to the
/// returned log and evaluates to `x`.
pub fn recording_env() -> (Environment, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut env = Environment::new();
    let sink = Arc::clone(&log);
    env.add_function("record", move |_: &State<'_>, args: Vec<Value>| {
        let value = args.into_iter().next().unwrap_or_default();
        if let Ok(mut log) = sink.lock() {
            log.push(value.to_string());
        }
        Ok(value)
    });
    (env, log)
}
