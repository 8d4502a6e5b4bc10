use aura_tools::spec::ArgMap;
use serde_json::json;

/// One declarative routing rule.
///
/// Rule order is part of the routing contract: the pattern phase evaluates
/// rules in declared order and the first match wins. Promoted capabilities
/// always compile after these.
#[derive(Debug, Clone)]
pub struct RouteRule {
    /// Stable rule name.
    pub name: String,
    /// Tool the rule resolves to.
    pub tool_name: String,
    /// Regex patterns with named captures, tried in order.
    pub patterns: Vec<String>,
    /// Single-token keywords for the keyword phase.
    pub keywords: Vec<String>,
    /// Canonical phrasings for the fuzzy phase.
    pub canonical: Vec<String>,
    /// Arguments merged into every match (captures override).
    pub fixed_args: ArgMap,
}

impl RouteRule {
    fn new(name: &str, tool_name: &str) -> Self {
        Self {
            name: name.to_string(),
            tool_name: tool_name.to_string(),
            patterns: Vec::new(),
            keywords: Vec::new(),
            canonical: Vec::new(),
            fixed_args: ArgMap::new(),
        }
    }

    fn patterns(mut self, patterns: &[&str]) -> Self {
        self.patterns = patterns.iter().map(|p| (*p).to_string()).collect();
        self
    }

    fn keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| (*k).to_string()).collect();
        self
    }

    fn canonical(mut self, phrases: &[&str]) -> Self {
        self.canonical = phrases.iter().map(|p| (*p).to_string()).collect();
        self
    }

    fn fixed(mut self, key: &str, value: serde_json::Value) -> Self {
        self.fixed_args.insert(key.to_string(), value);
        self
    }
}

/// The builtin rule table in contract order.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn builtin_rules() -> Vec<RouteRule> {
    vec![
        RouteRule::new("set_volume", "set_volume")
            .patterns(&[
                r"(?:set|change|adjust|turn)\s+(?:the\s+)?volume\s+(?:to\s+)?(?P<level>\d+)",
                r"volume\s+(?:to\s+)?(?P<level>\d+)",
                r"(?P<level>\d+)\s*%?\s*volume",
            ])
            .keywords(&["volume", "level"]),
        RouteRule::new("volume_up", "adjust_volume")
            .patterns(&[
                r"(?:turn|volume)\s+up",
                r"increase\s+(?:the\s+)?volume",
                r"raise\s+(?:the\s+)?volume",
                r"\blouder\b",
            ])
            .canonical(&["turn up the volume", "make it louder"])
            .fixed("delta", json!(10)),
        RouteRule::new("volume_down", "adjust_volume")
            .patterns(&[
                r"(?:turn|volume)\s+down",
                r"decrease\s+(?:the\s+)?volume",
                r"lower\s+(?:the\s+)?volume",
                r"\bquieter\b",
            ])
            .canonical(&["turn down the volume", "make it quieter"])
            .fixed("delta", json!(-10)),
        RouteRule::new("mute", "mute")
            .patterns(&[r"\bmute\b", r"silence\s+(?:the\s+)?(?:volume|sound|audio)"])
            .keywords(&["mute"])
            .canonical(&["silence the audio"]),
        RouteRule::new("unmute", "unmute")
            .patterns(&[r"\bunmute\b", r"\b(?:sound|audio)\s+(?:back\s+)?on\b"])
            .keywords(&["unmute"]),
        RouteRule::new("media_play_pause", "media_play_pause")
            .patterns(&[r"\bpause\b", r"\bresume\b", r"play\s*pause"])
            .canonical(&["pause the music"]),
        RouteRule::new("media_next", "media_next")
            .patterns(&[r"(?:next|skip)\s+(?:track|song)", r"skip\s+this"])
            .keywords(&["skip"])
            .canonical(&["next song"]),
        RouteRule::new("media_previous", "media_previous")
            .patterns(&[r"(?:previous|last)\s+(?:track|song)"])
            .canonical(&["previous song"]),
        RouteRule::new("set_brightness", "set_brightness")
            .patterns(&[
                r"(?:set|change|adjust)\s+(?:the\s+)?brightness\s+(?:to\s+)?(?P<level>\d+)",
                r"brightness\s+(?:to\s+)?(?P<level>\d+)",
                r"(?P<level>\d+)\s*%?\s*brightness",
            ])
            .keywords(&["brightness", "backlight"]),
        RouteRule::new("brightness_up", "adjust_brightness")
            .patterns(&[
                r"increase\s+(?:the\s+)?brightness",
                r"\bbrighter\b",
                r"brightness\s+up",
            ])
            .canonical(&["make it brighter", "brighten the screen"])
            .fixed("delta", json!(20)),
        RouteRule::new("brightness_down", "adjust_brightness")
            .patterns(&[
                r"decrease\s+(?:the\s+)?brightness",
                r"\b(?:dimmer|darker)\b",
                r"brightness\s+down",
                r"dim\s+(?:the\s+)?screen",
            ])
            .canonical(&["make it darker", "dim the screen"])
            .fixed("delta", json!(-20)),
        RouteRule::new("take_screenshot", "take_screenshot")
            .patterns(&[
                r"(?:take|capture)\s+(?:a\s+)?screenshot",
                r"\bscreenshot\b",
                r"capture\s+(?:the\s+)?screen",
                r"print\s+screen",
            ])
            .keywords(&["screenshot"])
            .canonical(&["take a screenshot", "capture the screen"]),
        RouteRule::new("lock_computer", "lock_computer")
            .patterns(&[r"lock\s+(?:the\s+|my\s+)?(?:computer|pc|screen|workstation)"])
            .keywords(&["lock"])
            .canonical(&["lock the computer", "lock my pc"]),
        RouteRule::new("sleep_computer", "sleep_computer")
            .patterns(&[
                r"(?:put|send)\s+(?:the\s+)?(?:computer|pc)\s+to\s+sleep",
                r"\bstandby\b",
            ])
            .keywords(&["standby"]),
        RouteRule::new("shutdown_computer", "shutdown_computer")
            .patterns(&[
                r"(?:shut\s*down|power\s+off)(?:\s+(?:the\s+)?(?:computer|pc|system))?",
            ])
            .keywords(&["shutdown"]),
        RouteRule::new("restart_computer", "restart_computer")
            .patterns(&[
                r"(?:restart|reboot)\s+(?:the\s+)?(?:computer|pc|system)",
                r"\breboot\b",
            ])
            .keywords(&["reboot"]),
        RouteRule::new("empty_recycle_bin", "empty_recycle_bin")
            .patterns(&[r"(?:empty|clear)\s+(?:the\s+)?(?:recycle\s+bin|trash)"])
            .keywords(&["recycle"])
            .canonical(&["empty the recycle bin", "clear the trash"]),
        RouteRule::new("open_file_explorer", "open_file_explorer")
            .patterns(&[
                r"open\s+(?:the\s+)?file\s+(?:explorer|manager)",
                r"open\s+(?:my\s+)?files$",
                r"open\s+(?:my\s+computer|this\s+pc)",
            ])
            .keywords(&["explorer"])
            .canonical(&["open file manager", "open my files"]),
        RouteRule::new("current_time", "current_time")
            .patterns(&[
                r"(?:what'?s|what\s+is)\s+the\s+time",
                r"current\s+time",
                r"tell\s+(?:me\s+)?the\s+time",
                r"(?:what'?s|what\s+is)\s+(?:the\s+|today'?s\s+)?date",
                r"today'?s\s+date",
            ])
            .keywords(&["time"])
            .canonical(&["what time is it", "what is the date"]),
        RouteRule::new("open_website", "open_website")
            .patterns(&[
                r"(?:go\s+to|visit|navigate\s+to|open)\s+(?P<url>\S+\.(?:com|org|net|io|edu|gov|co|in)\S*)",
            ])
            .keywords(&["website", "visit"]),
        RouteRule::new("web_search", "web_search")
            .patterns(&[
                r"(?:google|look\s+up)\s+(?P<query>.+)$",
                r"search\s+(?:the\s+web\s+)?for\s+(?P<query>.+)$",
            ])
            .keywords(&["google"]),
        RouteRule::new("create_dir", "create_dir")
            .patterns(&[
                r"(?:create|make|new)\s+(?:a\s+)?(?:folder|directory)\s+(?:named\s+|called\s+)?(?P<path>.+)$",
            ])
            .keywords(&["folder", "directory"]),
        RouteRule::new("take_note", "take_note")
            .patterns(&[
                r"(?:take|make|create)\s+(?:a\s+)?note\s+(?:that\s+)?(?P<content>.+)$",
                r"(?:take|make|create)\s+(?:a\s+)?note\s*:\s*(?P<content>.+)$",
                r"(?:write|jot)\s+down\s+(?P<content>.+)$",
            ])
            .keywords(&["note", "jot"]),
        RouteRule::new("write_file", "write_file")
            .patterns(&[
                r"(?:create|make|new)\s+(?:a\s+)?(?:text\s+)?file\s+(?:named\s+|called\s+)?(?P<path>\S+)\s+(?:with|containing)\s+(?P<contents>.+)$",
                r"(?:create|make|new)\s+(?:a\s+)?(?:text\s+)?file\s+(?:named\s+|called\s+)?(?P<path>\S+)$",
                r"(?:write|save)\s+(?P<contents>.+?)\s+(?:into|to)\s+(?:a\s+file\s+)?(?P<path>\S+\.\w+)$",
            ])
            .keywords(&["file", "save"]),
        RouteRule::new("read_file", "read_file")
            .patterns(&[r"(?:read|show)\s+(?:the\s+)?file\s+(?P<path>\S+)"])
            .keywords(&["read", "file"]),
        RouteRule::new("delete_path", "delete_path")
            .patterns(&[
                r"(?:delete|remove)\s+(?:the\s+)?(?:file|folder|directory)\s+(?P<path>\S+)",
            ])
            .keywords(&["delete", "remove"]),
        RouteRule::new("type_text", "type_text")
            .patterns(&[r"^type\s+(?P<text>.+)$"])
            .keywords(&["type"]),
        RouteRule::new("press_key", "press_key")
            .patterns(&[r"^(?:press|hit)\s+(?:the\s+)?(?:key\s+)?(?P<key>.+)$"])
            .keywords(&["press"]),
        RouteRule::new("mouse_click", "mouse_click")
            .patterns(&[r"^(?:left\s+)?click(?:\s+at\s+(?P<x>\d+)\s*,?\s*(?P<y>\d+))?$"]),
        RouteRule::new("clipboard_write", "clipboard_write")
            .patterns(&[r"copy\s+(?P<text>.+?)\s+to\s+(?:the\s+)?clipboard"])
            .keywords(&["clipboard"]),
        RouteRule::new("clipboard_read", "clipboard_read")
            .patterns(&[r"(?:read|show|paste)\s+(?:the\s+)?clipboard"]),
        RouteRule::new("run_terminal_command", "run_terminal_command")
            .patterns(&[
                r"(?:run|execute)\s+(?:the\s+)?(?:command|cmd)\s+(?P<command>.+)$",
                r"in\s+(?:the\s+)?terminal\s+(?:run|execute)\s+(?P<command>.+)$",
            ])
            .keywords(&["terminal", "cmd"]),
        RouteRule::new("open_app", "open_app")
            .patterns(&[r"^(?:open|launch|start)\s+(?P<name>.+?)(?:\s+app(?:lication)?)?$"])
            .keywords(&["open", "launch"]),
        RouteRule::new("close_app", "close_app")
            .patterns(&[r"^(?:close|quit|kill|terminate)\s+(?P<name>.+?)(?:\s+app(?:lication)?)?$"])
            .keywords(&["close", "quit"]),
        RouteRule::new("install_dependency", "install_dependency")
            .patterns(&[
                r"install\s+(?:the\s+)?(?:package|module|library)\s+(?P<package>[A-Za-z0-9_.-]+)",
            ])
            .keywords(&["install", "package"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_names_are_unique() {
        let rules = builtin_rules();
        let mut names: Vec<&str> = rules.iter().map(|r| r.name.as_str()).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len());
    }

    #[test]
    fn argful_rules_keep_specific_patterns_first() {
        let rules = builtin_rules();
        let set_volume = rules.iter().find(|r| r.name == "set_volume").unwrap();
        assert!(set_volume.patterns[0].contains("(?P<level>"));
    }
}
