use std::io::IsTerminal;

use anstyle::{AnsiColor, Style};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputStyle {
    Plain,
    Rich,
}

#[derive(Copy, Clone, Debug)]
pub struct Renderer {
    style: OutputStyle,
}

impl Renderer {
    pub fn detect() -> Self {
        let style = if std::env::var_os("NO_COLOR").is_some() || !std::io::stdout().is_terminal()
        {
            OutputStyle::Plain
        } else {
            OutputStyle::Rich
        };
        Self { style }
    }

    pub fn print_status(self, status: &str, message: &str) {
        println!("{}", render_status_line(self.style, status, message));
    }

    pub fn print_field(self, name: &str, value: &str) {
        println!("{}", render_field_line(self.style, name, value));
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    let tag = format!("[{status}]");
    match style {
        OutputStyle::Plain => format!("{tag} {message}"),
        OutputStyle::Rich => format!("{} {message}", colorize(status_style(status), &tag)),
    }
}

pub(crate) fn render_field_line(style: OutputStyle, name: &str, value: &str) -> String {
    match style {
        OutputStyle::Plain => format!("{name}: {value}"),
        OutputStyle::Rich => format!("{}: {value}", colorize(field_style(), name)),
    }
}

fn status_style(status: &str) -> Style {
    match status {
        "installed" | "ok" => Style::new().fg_color(Some(AnsiColor::Green.into())).bold(),
        "error" => Style::new().fg_color(Some(AnsiColor::Red.into())).bold(),
        _ => Style::new().fg_color(Some(AnsiColor::BrightBlue.into())),
    }
}

fn field_style() -> Style {
    Style::new().bold()
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
