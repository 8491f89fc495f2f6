/// Raw SCAD source as supplied by the host widget, not yet canonicalized.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScadSource(String);

impl ScadSource {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Collapses runs of ASCII whitespace to a single space and trims the
    /// ends, so that cosmetic edits (reformatting, trailing newline
    /// changes) do not change the fingerprint or force a cache miss.
    ///
    /// This is not a SCAD parser: string literals and comments are not
    /// treated specially, matching the scope boundary that evaluating or
    /// parsing SCAD is out of scope for this engine.
    pub fn canonicalize(&self) -> String {
        let mut out = String::with_capacity(self.0.len());
        let mut last_was_space = false;
        for ch in self.0.chars() {
            if ch.is_whitespace() {
                if !last_was_space && !out.is_empty() {
                    out.push(' ');
                }
                last_was_space = true;
            } else {
                out.push(ch);
                last_was_space = false;
            }
        }
        if out.ends_with(' ') {
            out.pop();
        }
        out
    }
}

impl From<String> for ScadSource {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for ScadSource {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}
