use std::collections::HashMap;

const BOLD: &str = "1";
const UNDERSCORE: &str = "4";
const STRIKE: &str = "9";
const GREEN: &str = "32";
const BROWN: &str = "33";
const BLUE: &str = "34";
const CYAN: &str = "36";
const GRAY: &str = "90";

/// What a colored span means; the palette decides how it looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    UserName,
    UserId,
    Time,
    Source,
    Retweet,
    Favorite,
    Url,
    Tag,
    Verified,
    Protected,
    Ng,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    Mono,
    Ansi16,
    #[default]
    Ansi256,
}

impl ColorMode {
    pub fn from_depth(depth: u32) -> Option<Self> {
        match depth {
            2 => Some(ColorMode::Mono),
            16 => Some(ColorMode::Ansi16),
            256 => Some(ColorMode::Ansi256),
            _ => None,
        }
    }

    fn is_rich(self) -> bool {
        self == ColorMode::Ansi256
    }
}

/// SGR parameters per role.
#[derive(Debug, Clone)]
pub struct Palette {
    codes: HashMap<Role, String>,
}

impl Palette {
    pub fn new(mode: ColorMode, white_background: bool) -> Self {
        let blue = if white_background { BLUE } else { CYAN };

        let username = if white_background && mode.is_rich() {
            "38;5;136"
        } else {
            BROWN
        };
        let green = if mode.is_rich() { "38;5;28" } else { GREEN };
        let fav = if white_background && mode.is_rich() {
            "38;5;184"
        } else {
            BROWN
        };

        let codes = HashMap::from([
            (Role::UserName, username.to_string()),
            (Role::UserId, blue.to_string()),
            (Role::Time, GRAY.to_string()),
            (Role::Source, GRAY.to_string()),
            (Role::Retweet, format!("{BOLD};{green}")),
            (Role::Favorite, format!("{BOLD};{fav}")),
            (Role::Url, format!("{UNDERSCORE};{blue}")),
            (Role::Tag, blue.to_string()),
            (Role::Verified, CYAN.to_string()),
            (Role::Protected, GRAY.to_string()),
            (Role::Ng, format!("{STRIKE};{GRAY}")),
        ]);
        Self { codes }
    }

    pub fn paint(&self, text: &str, role: Role) -> String {
        match self.codes.get(&role) {
            Some(code) => format!("\x1b[{code}m{text}\x1b[0m"),
            None => text.to_string(),
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::new(ColorMode::default(), false)
    }
}
