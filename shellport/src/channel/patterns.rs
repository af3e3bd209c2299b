//! Prompt detection on lines of terminal text.

use regex::Regex;

/// Default prompt terminator: one of the usual shell prompt characters,
/// optionally followed by a single whitespace character.
pub const DEFAULT_PROMPT_PATTERN: &str = r"[$#%>]\s?";

/// A prompt found inside a single line.
///
/// Borrowed from the line it was detected in and only lives while that
/// line is processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMatch<'a> {
    /// Byte offset where the prompt terminator starts.
    pub offset: usize,

    /// The matched terminator text (e.g. `"$ "`).
    pub matched: &'a str,

    /// Remote directory as rendered by the prompt: the text between the
    /// first `:` and the terminator. Empty when it cannot be derived.
    pub directory: &'a str,

    /// Everything the user typed after the prompt.
    pub command_text: &'a str,
}

/// Trait for prompt detection - regex by default, swappable for stricter schemes.
pub trait PromptDetector: Send + Sync {
    /// Returns the prompt found in `line`, or None if the line is not a prompt line.
    fn detect<'a>(&self, line: &'a str) -> Option<PromptMatch<'a>>;

    /// Check if the line contains a prompt.
    fn is_prompt(&self, line: &str) -> bool {
        self.detect(line).is_some()
    }
}

/// Regex-based prompt detector (the default implementation).
#[derive(Debug, Clone)]
pub struct RegexPromptDetector {
    pattern: Regex,
}

impl RegexPromptDetector {
    /// Create a detector from a terminator pattern.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }
}

impl Default for RegexPromptDetector {
    fn default() -> Self {
        Self {
            pattern: Regex::new(DEFAULT_PROMPT_PATTERN).expect("default prompt pattern is valid"),
        }
    }
}

impl PromptDetector for RegexPromptDetector {
    fn detect<'a>(&self, line: &'a str) -> Option<PromptMatch<'a>> {
        let m = self.pattern.find(line)?;
        Some(PromptMatch {
            offset: m.start(),
            matched: m.as_str(),
            directory: directory_before(line, m.start()),
            command_text: &line[m.end()..],
        })
    }
}

/// Text between the first colon and `offset`, as in `host:cwd$ `.
///
/// Without a colon the whole prefix is used; a colon past the prompt
/// yields an empty directory.
fn directory_before(line: &str, offset: usize) -> &str {
    let start = line.find(':').map(|colon| colon + 1).unwrap_or(0);
    if start > offset {
        return "";
    }
    &line[start..offset]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_user_prompt() {
        let detector = RegexPromptDetector::default();
        let m = detector.detect("user:/home/u$ get report.pdf").unwrap();
        assert_eq!(m.offset, 12);
        assert_eq!(m.matched, "$ ");
        assert_eq!(m.directory, "/home/u");
        assert_eq!(m.command_text, "get report.pdf");
    }

    #[test]
    fn test_home_directory_prompt() {
        let detector = RegexPromptDetector::default();
        let m = detector.detect("user@host:~$ ls").unwrap();
        assert_eq!(m.directory, "~");
        assert_eq!(m.command_text, "ls");
    }

    #[test]
    fn test_root_and_other_terminators() {
        let detector = RegexPromptDetector::default();
        assert_eq!(detector.detect("root@box:/etc# ").unwrap().directory, "/etc");
        assert_eq!(detector.detect("host:/tmp% ").unwrap().matched, "% ");
        assert_eq!(detector.detect("C:/work> dir").unwrap().matched, "> ");
    }

    #[test]
    fn test_terminator_without_space() {
        let detector = RegexPromptDetector::default();
        let m = detector.detect("host:/srv$").unwrap();
        assert_eq!(m.matched, "$");
        assert_eq!(m.command_text, "");
    }

    #[test]
    fn test_no_prompt() {
        let detector = RegexPromptDetector::default();
        assert!(detector.detect("total 42").is_none());
        assert!(!detector.is_prompt("drwxr-xr-x 2 user user 4096 report"));
        assert!(!detector.is_prompt(""));
    }

    #[test]
    fn test_directory_without_colon() {
        let detector = RegexPromptDetector::default();
        let m = detector.detect("bash-5.2$ pwd").unwrap();
        assert_eq!(m.directory, "bash-5.2");

        let m = detector.detect("$ get a").unwrap();
        assert_eq!(m.directory, "");
    }

    #[test]
    fn test_colon_after_terminator() {
        let detector = RegexPromptDetector::default();
        let m = detector.detect("$ echo a:b").unwrap();
        assert_eq!(m.directory, "");
        assert_eq!(m.command_text, "echo a:b");
    }

    #[test]
    fn test_first_terminator_wins() {
        let detector = RegexPromptDetector::default();
        let m = detector.detect("u:/a$ echo $HOME").unwrap();
        assert_eq!(m.offset, 4);
        assert_eq!(m.command_text, "echo $HOME");
    }

    #[test]
    fn test_custom_pattern() {
        let detector = RegexPromptDetector::new(r"❯\s?").unwrap();
        let m = detector.detect("host:~/src ❯ put a.txt").unwrap();
        assert_eq!(m.directory, "~/src ");
        assert_eq!(m.command_text, "put a.txt");
        assert!(RegexPromptDetector::new("(").is_err());
    }
}
