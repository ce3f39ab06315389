use ratatui::style::Color;

pub struct Theme {
  pub name: &'static str,
  pub bg: Color,
  pub fg: Color,
  pub accent: Color,
  /// Emphasis for the best-match card.
  pub secondary: Color,
  pub muted: Color,
  pub border: Color,
  pub highlight_fg: Color,
  pub highlight_bg: Color,
  pub status: Color,
  pub success: Color,
  pub error: Color,
  pub error_bg: Color,
  pub key_fg: Color,
  pub key_bg: Color,
}

pub const THEMES: [Theme; 3] = [
  Theme {
    name: "Finder",
    bg: Color::Rgb(244, 246, 250),
    fg: Color::Rgb(33, 33, 33),
    accent: Color::Rgb(25, 118, 210),
    secondary: Color::Rgb(245, 0, 87),
    muted: Color::Rgb(117, 117, 117),
    border: Color::Rgb(189, 200, 220),
    highlight_fg: Color::Rgb(255, 255, 255),
    highlight_bg: Color::Rgb(25, 118, 210),
    status: Color::Rgb(25, 118, 210),
    success: Color::Rgb(46, 125, 50),
    error: Color::Rgb(198, 40, 40),
    error_bg: Color::Rgb(255, 235, 238),
    key_fg: Color::Rgb(255, 255, 255),
    key_bg: Color::Rgb(97, 97, 97),
  },
  Theme {
    name: "Midnight",
    bg: Color::Rgb(18, 18, 24),
    fg: Color::Rgb(220, 220, 230),
    accent: Color::Rgb(100, 181, 246),
    secondary: Color::Rgb(255, 64, 129),
    muted: Color::Rgb(130, 130, 150),
    border: Color::Rgb(60, 60, 80),
    highlight_fg: Color::Rgb(18, 18, 24),
    highlight_bg: Color::Rgb(100, 181, 246),
    status: Color::Rgb(129, 212, 250),
    success: Color::Rgb(129, 199, 132),
    error: Color::Rgb(239, 83, 80),
    error_bg: Color::Rgb(60, 20, 24),
    key_fg: Color::Rgb(18, 18, 24),
    key_bg: Color::Rgb(130, 130, 150),
  },
  Theme {
    name: "Terminal",
    bg: Color::Reset,
    fg: Color::Reset,
    accent: Color::Cyan,
    secondary: Color::Magenta,
    muted: Color::DarkGray,
    border: Color::DarkGray,
    highlight_fg: Color::Black,
    highlight_bg: Color::Cyan,
    status: Color::Cyan,
    success: Color::Green,
    error: Color::Red,
    error_bg: Color::Reset,
    key_fg: Color::Black,
    key_bg: Color::Gray,
  },
];
