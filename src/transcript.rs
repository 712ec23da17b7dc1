use std::path::Path;

/// Text produced for one audio chunk. Silent chunks keep their slot with an
/// empty string so fragment positions stay gap-free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptFragment {
    pub index: usize,
    pub text: String,
}

impl TranscriptFragment {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }
}

/// Ordered collection of fragments for one finished run.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    fragments: Vec<TranscriptFragment>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the next fragment. Indices must arrive in ascending order.
    pub fn push(&mut self, fragment: TranscriptFragment) {
        if let Some(last) = self.fragments.last() {
            debug_assert!(fragment.index > last.index, "fragments out of order");
        }
        self.fragments.push(fragment);
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// The full transcript: fragments concatenated in index order. Nothing is
    /// inserted between fragments; separators are whatever the fragments
    /// already carry.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for fragment in &self.fragments {
            out.push_str(&fragment.text);
        }
        out
    }

    /// Writes the transcript as UTF-8 plain text.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_is_pure_concatenation() {
        let mut transcript = Transcript::new();
        transcript.push(TranscriptFragment::new(0, "Hello "));
        transcript.push(TranscriptFragment::new(1, "world. "));
        transcript.push(TranscriptFragment::new(2, "Done."));
        assert_eq!(transcript.text(), "Hello world. Done.");
    }

    #[test]
    fn empty_fragments_contribute_nothing() {
        let mut transcript = Transcript::new();
        transcript.push(TranscriptFragment::new(0, "one\n"));
        transcript.push(TranscriptFragment::new(1, ""));
        transcript.push(TranscriptFragment::new(2, "three\n"));
        assert_eq!(transcript.text(), "one\nthree\n");
        assert_eq!(transcript.len(), 3);
    }

    #[test]
    fn save_writes_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.txt");
        let mut transcript = Transcript::new();
        transcript.push(TranscriptFragment::new(0, "héllo\n"));
        transcript.save(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "héllo\n");
    }
}
