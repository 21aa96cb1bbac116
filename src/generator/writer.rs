//! Indenting source writer shared by backends.

#[derive(Debug, Default)]
pub struct CodeWriter {
    out: String,
    depth: usize,
    counter: usize,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.out.push_str("    ");
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Write `text` and indent what follows.
    pub fn open(&mut self, text: impl AsRef<str>) {
        self.line(text);
        self.depth += 1;
    }

    /// Dedent, then write `text`.
    pub fn close(&mut self, text: impl AsRef<str>) {
        self.depth = self.depth.saturating_sub(1);
        self.line(text);
    }

    /// Fresh local identifier `prefix` + unique number.
    pub fn fresh(&mut self, prefix: &str) -> String {
        let id = format!("{prefix}{}", self.counter);
        self.counter += 1;
        id
    }

    /// Restart local numbering; called at the top of every generated function.
    pub fn reset_locals(&mut self) {
        self.counter = 0;
    }

    pub fn finish(self) -> String {
        self.out
    }
}
