//! File attachments waiting to go out with the next message.

use std::fs;
use std::path::Path;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::events::{AppEvent, EventBus};
use crate::types::FileReference;
use crate::utils::format::{format_file_size, guess_mime_type};

/// Default size limit: 10 MB.
pub const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;

/// Default accepted MIME types.
pub const DEFAULT_ALLOWED_TYPES: &[&str] = &["image/*", "text/*", "application/pdf"];

/// Limits applied to every attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    /// Largest accepted file, in bytes.
    pub max_size: u64,
    /// Accepted MIME types; `type/*` accepts a whole family.
    pub allowed_types: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            allowed_types: DEFAULT_ALLOWED_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl UploadPolicy {
    fn allows_type(&self, mime_type: &str) -> bool {
        let mime_type = mime_type.to_ascii_lowercase();
        self.allowed_types.iter().any(|allowed| {
            match allowed.strip_suffix("/*") {
                Some(family) => mime_type
                    .split_once('/')
                    .is_some_and(|(ty, _)| ty == family),
                None => *allowed == mime_type,
            }
        })
    }
}

/// Check one file against `policy`.
///
/// Size is checked first, so an oversized file of an unsupported type reports
/// the size problem.
pub fn validate_file(name: &str, size: u64, mime_type: &str, policy: &UploadPolicy) -> Result<()> {
    if size > policy.max_size {
        return Err(Error::validation(
            format!("File size must be less than {}", format_file_size(policy.max_size)),
            Some(name.to_string()),
        ));
    }
    if !policy.allows_type(mime_type) {
        return Err(Error::validation(
            "File type not supported",
            Some(name.to_string()),
        ));
    }
    Ok(())
}

/// A file ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name without directories.
    pub name: String,
    /// MIME type.
    pub mime_type: String,
    /// Contents.
    pub bytes: Bytes,
}

impl Attachment {
    /// Create an attachment.
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// The reference stored on the message that carries this file.
    pub fn reference(&self) -> FileReference {
        FileReference {
            name: self.name.clone(),
            size: self.size(),
            mime_type: self.mime_type.clone(),
        }
    }
}

/// Outcome of adding several files at once.
#[derive(Debug, Clone, Default)]
pub struct UploadBatch {
    /// Files accepted.
    pub accepted: usize,
    /// Files refused, with the reason for each.
    pub rejected: Vec<(String, Error)>,
}

/// Holds the attachments for the message being composed.
#[derive(Debug, Clone)]
pub struct UploadController {
    policy: UploadPolicy,
    files: Vec<Attachment>,
    events: EventBus,
}

impl UploadController {
    /// An empty controller announcing changes on `events`.
    pub fn new(policy: UploadPolicy, events: EventBus) -> Self {
        Self {
            policy,
            files: Vec::new(),
            events,
        }
    }

    /// The policy in force.
    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Attachments in the order they were added.
    pub fn files(&self) -> &[Attachment] {
        &self.files
    }

    /// Number of attachments.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if nothing is attached.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn changed(&self) {
        self.events.emit(AppEvent::UploadChanged {
            count: self.files.len(),
        });
    }

    /// Validate and attach one file.
    pub fn add(&mut self, attachment: Attachment) -> Result<()> {
        validate_file(
            &attachment.name,
            attachment.size(),
            &attachment.mime_type,
            &self.policy,
        )?;
        tracing::debug!(name = %attachment.name, size = attachment.size(), "attached file");
        self.files.push(attachment);
        self.changed();
        Ok(())
    }

    /// Validate and attach each file independently.
    ///
    /// A rejected file never keeps the others out.
    pub fn add_all(&mut self, attachments: impl IntoIterator<Item = Attachment>) -> UploadBatch {
        let mut batch = UploadBatch::default();
        for attachment in attachments {
            let name = attachment.name.clone();
            match self.add(attachment) {
                Ok(()) => batch.accepted += 1,
                Err(err) => {
                    tracing::warn!(name = %name, error = %err, "attachment rejected");
                    batch.rejected.push((name, err));
                }
            }
        }
        batch
    }

    /// Read a file from disk and attach it.
    ///
    /// The size is checked before the contents are read.
    pub fn add_path(&mut self, path: &Path) -> Result<()> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::validation("Not a file", Some(path.display().to_string())))?;
        let metadata = fs::metadata(path)
            .map_err(|err| Error::io(format!("failed to read {}", path.display()), err))?;
        if !metadata.is_file() {
            return Err(Error::validation("Not a file", Some(name)));
        }
        let mime_type = guess_mime_type(&name);
        validate_file(&name, metadata.len(), mime_type, &self.policy)?;
        let bytes = fs::read(path)
            .map_err(|err| Error::io(format!("failed to read {}", path.display()), err))?;
        self.add(Attachment::new(name, mime_type, Bytes::from(bytes)))
    }

    /// Detach the file at `index`.
    pub fn remove(&mut self, index: usize) -> Option<Attachment> {
        if index >= self.files.len() {
            return None;
        }
        let removed = self.files.remove(index);
        self.changed();
        Some(removed)
    }

    /// Detach everything.
    pub fn clear(&mut self) {
        if !self.files.is_empty() {
            self.files.clear();
            self.changed();
        }
    }

    /// Detach and return everything, for sending.
    pub fn take(&mut self) -> Vec<Attachment> {
        let files = std::mem::take(&mut self.files);
        if !files.is_empty() {
            self.changed();
        }
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::drain;

    fn sized(name: &str, size: usize) -> Attachment {
        Attachment::new(name, guess_mime_type(name), Bytes::from(vec![0u8; size]))
    }

    #[test]
    fn oversized_file_is_rejected_for_size() {
        let policy = UploadPolicy::default();
        let err = validate_file("video.png", 15 * 1024 * 1024, "image/png", &policy).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.detail(), "File size must be less than 10 MB");
    }

    #[test]
    fn executable_is_rejected_for_type() {
        let policy = UploadPolicy::default();
        let err = validate_file("setup.exe", 1024, guess_mime_type("setup.exe"), &policy).unwrap_err();
        assert_eq!(err.detail(), "File type not supported");
    }

    #[test]
    fn small_png_passes() {
        let policy = UploadPolicy::default();
        assert!(validate_file("diagram.png", 500 * 1024, "image/png", &policy).is_ok());
        assert!(validate_file("notes.txt", 10, "text/plain", &policy).is_ok());
        assert!(validate_file("paper.pdf", 10, "application/pdf", &policy).is_ok());
        assert!(validate_file("data.json", 10, "application/json", &policy).is_err());
    }

    #[test]
    fn batch_reports_each_file() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let mut uploads = UploadController::new(UploadPolicy::default(), bus);
        let batch = uploads.add_all(vec![
            sized("a.png", 500 * 1024),
            sized("setup.exe", 10),
            sized("b.txt", 10),
        ]);
        assert_eq!(batch.accepted, 2);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].0, "setup.exe");
        assert_eq!(uploads.len(), 2);
        assert_eq!(
            drain(&mut rx),
            vec![
                AppEvent::UploadChanged { count: 1 },
                AppEvent::UploadChanged { count: 2 },
            ]
        );
    }

    #[test]
    fn remove_and_take() {
        let mut uploads = UploadController::new(UploadPolicy::default(), EventBus::new());
        uploads.add(sized("a.png", 1)).unwrap();
        uploads.add(sized("b.png", 2)).unwrap();
        assert!(uploads.remove(5).is_none());
        assert_eq!(uploads.remove(0).unwrap().name, "a.png");
        let taken = uploads.take();
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].reference().size, 2);
        assert!(uploads.is_empty());
    }

    #[test]
    fn add_path_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        fs::write(&path, "hello").unwrap();
        let mut uploads = UploadController::new(UploadPolicy::default(), EventBus::new());
        uploads.add_path(&path).unwrap();
        assert_eq!(uploads.files()[0].mime_type, "text/plain");
        assert_eq!(&uploads.files()[0].bytes[..], b"hello");

        let exe = dir.path().join("tool.exe");
        fs::write(&exe, "MZ").unwrap();
        assert!(uploads.add_path(&exe).unwrap_err().is_validation());
        assert!(uploads.add_path(dir.path()).is_err());
        assert_eq!(uploads.len(), 1);
    }
}
