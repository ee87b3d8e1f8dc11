//! ANSI text styling for terminal-facing messages.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Bold,
    Dim,
    Red,
    Green,
    Yellow,
    Blue,
    Grey,
}

impl Style {
    pub fn open(&self) -> &'static str {
        match self {
            Style::Bold => "\u{1b}[1m",
            Style::Dim => "\u{1b}[2m",
            Style::Red => "\u{1b}[31m",
            Style::Green => "\u{1b}[32m",
            Style::Yellow => "\u{1b}[33m",
            Style::Blue => "\u{1b}[34m",
            Style::Grey => "\u{1b}[90m",
        }
    }

    pub fn close(&self) -> &'static str {
        match self {
            Style::Bold | Style::Dim => "\u{1b}[22m",
            _ => "\u{1b}[39m",
        }
    }

    pub fn paint(&self, text: &str) -> String {
        format!("{}{}{}", self.open(), text, self.close())
    }
}
