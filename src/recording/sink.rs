//! Output sink naming and rotation.
//!
//! Every capture run writes to its own sink. A restart allocates a fresh one
//! so a recovered capture never overwrites the segment it replaces; superseded
//! segments stay on disk as partial artifacts of the job.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Identity of one output target. Never mutated after allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sink {
    directory: PathBuf,
    call_name: String,
    token: String,
    extension: String,
}

impl Sink {
    pub fn new(directory: PathBuf, call_name: &str, token: String, extension: &str) -> Self {
        Self {
            directory,
            call_name: call_name.to_string(),
            token,
            extension: extension.to_string(),
        }
    }

    fn stem(&self) -> String {
        format!("{}-{}", self.call_name, self.token)
    }

    /// Media target the capturer writes to.
    pub fn path(&self) -> PathBuf {
        self.directory.join(format!("{}.{}", self.stem(), self.extension))
    }

    /// Side-car location for the job's metadata when this is the last sink.
    pub fn metadata_path(&self) -> PathBuf {
        self.directory.join(format!("{}.metadata.json", self.stem()))
    }
}

/// Allocates sinks for one job: same directory and call name, new token each time.
#[derive(Debug)]
pub struct SinkNamer {
    directory: PathBuf,
    call_name: String,
    extension: String,
    next_seq: u32,
}

impl SinkNamer {
    pub fn new(directory: PathBuf, call_name: &str, extension: &str) -> Self {
        Self {
            directory,
            call_name: sanitize_call_name(call_name),
            extension: extension.trim_start_matches('.').to_string(),
            next_seq: 1,
        }
    }

    /// Allocate a sink whose path differs from every sink this namer has
    /// handed out and from anything already on disk.
    pub fn next_sink(&mut self) -> Sink {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        loop {
            let token = format!("{}-{}", timestamp, self.next_seq);
            self.next_seq += 1;

            let sink = Sink::new(
                self.directory.clone(),
                &self.call_name,
                token,
                &self.extension,
            );
            if !sink.path().exists() {
                return sink;
            }
        }
    }

    /// Metadata location used when the job never allocated a sink.
    pub fn fallback_metadata_path(&self) -> PathBuf {
        self.directory.join(format!("{}.metadata.json", self.call_name))
    }
}

/// Keep file names portable: anything outside `[A-Za-z0-9_-]` becomes `_`.
pub fn sanitize_call_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "call".to_string()
    } else {
        cleaned
    }
}

/// The current sink, written by the monitor task on restart and read by the
/// stop path.
#[derive(Clone, Default)]
pub struct SinkHandle {
    inner: Arc<Mutex<Option<Sink>>>,
}

impl SinkHandle {
    pub async fn get(&self) -> Option<Sink> {
        self.inner.lock().await.clone()
    }

    /// Swap in a new sink, returning the one it supersedes.
    pub async fn replace(&self, sink: Sink) -> Option<Sink> {
        self.inner.lock().await.replace(sink)
    }
}
