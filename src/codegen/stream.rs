//! Indented source writer

const TAB: &str = "    ";

/// Line-oriented kernel source buffer
#[derive(Debug, Clone, Default)]
pub struct KernelStream {
    output: String,
    tab: usize,
}

impl KernelStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line at the current indentation.
    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.tab {
                self.output.push_str(TAB);
            }
            self.output.push_str(text);
        }
        self.output.push('\n');
    }

    pub fn blank(&mut self) {
        self.output.push('\n');
    }

    /// `header` followed by an opening brace on its own line
    pub fn open(&mut self, header: impl AsRef<str>) {
        let header = header.as_ref();
        if !header.is_empty() {
            self.line(header);
        }
        self.line("{");
        self.inc_tab();
    }

    pub fn close(&mut self) {
        self.dec_tab();
        self.line("}");
    }

    pub fn inc_tab(&mut self) {
        self.tab += 1;
    }

    pub fn dec_tab(&mut self) {
        self.tab = self.tab.saturating_sub(1);
    }

    pub fn depth(&self) -> usize {
        self.tab
    }

    pub fn as_str(&self) -> &str {
        &self.output
    }

    pub fn finish(self) -> String {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_indent() {
        let mut s = KernelStream::new();
        s.open("if (x)");
        s.line("y = 1;");
        s.open("");
        s.line("z = 2;");
        s.close();
        s.close();
        assert_eq!(s.depth(), 0);
        assert_eq!(
            s.finish(),
            "if (x)\n{\n    y = 1;\n    {\n        z = 2;\n    }\n}\n"
        );
    }

    #[test]
    fn test_dec_tab_saturates() {
        let mut s = KernelStream::new();
        s.dec_tab();
        s.line("a");
        assert_eq!(s.as_str(), "a\n");
    }
}
