use crate::client::error::UploadError;
use crate::client::types::FileDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// A file with the same name is already selected. Not an error.
    Duplicate,
}

/// Pending selection of files, capped at `max_files` and unique by name.
#[derive(Debug)]
pub struct SelectionGuard {
    files: Vec<FileDescriptor>,
    max_files: usize,
    at_limit: bool,
}

impl SelectionGuard {
    pub fn new(max_files: usize) -> Self {
        Self {
            files: Vec::new(),
            max_files,
            at_limit: false,
        }
    }

    pub fn admit(&mut self, candidate: FileDescriptor) -> Result<Admission, UploadError> {
        let mut staged = self.files.clone();
        let admission = stage(&mut staged, candidate, self.max_files)?;
        self.commit(staged);
        Ok(admission)
    }

    /// Admits one selection step. Stops at the first candidate that would
    /// overflow the batch, in which case none of the step's candidates are
    /// kept. Returns how many files were added.
    pub fn admit_all(
        &mut self,
        candidates: impl IntoIterator<Item = FileDescriptor>,
    ) -> Result<usize, UploadError> {
        let before = self.files.len();
        let mut staged = self.files.clone();
        for candidate in candidates {
            if let Err(e) = stage(&mut staged, candidate, self.max_files) {
                tracing::warn!("Selection rejected: {}", e);
                return Err(e);
            }
        }
        self.commit(staged);
        Ok(self.files.len() - before)
    }

    /// Drops a selected file by name. Returns whether one was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.files.len();
        self.files.retain(|f| f.name != name);
        self.at_limit = false;
        self.files.len() != before
    }

    /// Hands the selection over for upload and leaves the guard empty.
    pub fn take(&mut self) -> Vec<FileDescriptor> {
        self.at_limit = false;
        std::mem::take(&mut self.files)
    }

    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// True once the selection holds exactly `max_files` files.
    pub fn is_at_limit(&self) -> bool {
        self.at_limit
    }

    pub fn max_files(&self) -> usize {
        self.max_files
    }

    fn commit(&mut self, staged: Vec<FileDescriptor>) {
        self.files = staged;
        if self.files.len() == self.max_files && !self.at_limit {
            tracing::info!("Max files reached ({})", self.max_files);
        }
        self.at_limit = self.files.len() == self.max_files;
    }
}

fn stage(
    staged: &mut Vec<FileDescriptor>,
    candidate: FileDescriptor,
    max_files: usize,
) -> Result<Admission, UploadError> {
    if staged.iter().any(|f| f.name == candidate.name) {
        tracing::debug!("Skipping duplicate selection: {}", candidate.name);
        return Ok(Admission::Duplicate);
    }
    if staged.len() >= max_files {
        return Err(UploadError::BatchLimitExceeded { limit: max_files });
    }
    staged.push(candidate);
    Ok(Admission::Accepted)
}
