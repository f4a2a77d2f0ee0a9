use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::PathBuf;
use std::sync::Mutex;

/// Where ingestion CSVs live. `Ok(None)` means the object does not exist.
pub trait CsvSource: Send + Sync {
    fn open(&self, path: &str) -> io::Result<Option<Box<dyn Read + Send>>>;
}

/// Reads `<root>/<path>` from the local filesystem.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl CsvSource for DirectorySource {
    fn open(&self, path: &str) -> io::Result<Option<Box<dyn Read + Send>>> {
        match File::open(self.root.join(path.trim_start_matches('/'))) {
            Ok(file) => Ok(Some(Box::new(file))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemorySource {
    objects: Mutex<HashMap<String, String>>,
}

impl InMemorySource {
    pub fn insert(&self, path: impl Into<String>, contents: impl Into<String>) {
        self.objects
            .lock()
            .expect("source mutex poisoned")
            .insert(path.into(), contents.into());
    }
}

impl CsvSource for InMemorySource {
    fn open(&self, path: &str) -> io::Result<Option<Box<dyn Read + Send>>> {
        let objects = self.objects.lock().expect("source mutex poisoned");
        Ok(objects.get(path).map(|contents| {
            Box::new(Cursor::new(contents.clone().into_bytes())) as Box<dyn Read + Send>
        }))
    }
}
