// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Configuration file parser.
//!
//! Line-oriented: one directive per line, `#` and `;` start comment lines, a bad line is
//! reported and skipped without invalidating the rest of the file.

// From dependency library

// From standard library
use std::str::FromStr;

// From this library
use crate::config::ConfigSnapshot;
use crate::config::Led;
use crate::core::errors::ParserError;
use crate::core::flags::EntryOptions;
use crate::core::matcher::{Condition, MatchAtom, MatchField, MatchOp};

/// Parses a whole configuration file. Bad lines are logged against `origin` and skipped.
pub(super) fn parse(contents: &str, origin: &str) -> ConfigSnapshot {
    let mut snapshot = ConfigSnapshot::default();

    for (index, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Err(e) = apply_line(line, &mut snapshot) {
            log::warn!("{} line {}: parse error: {}", origin, index + 1, e);
        }
    }

    snapshot
}

fn apply_line(line: &str, snapshot: &mut ConfigSnapshot) -> Result<(), ParserError> {
    let mut cursor = Cursor::new(line);
    let keyword = cursor.word()?;

    match keyword {
        "scan-fstab" => {
            cursor.assignment()?;
            snapshot.settings.scan_fstab = cursor.boolean()?;
        }
        "model-alias" => {
            cursor.assignment()?;
            snapshot.settings.model_alias = cursor.boolean()?;
        }
        "label-alias" => {
            cursor.assignment()?;
            snapshot.settings.label_alias = cursor.boolean()?;
        }
        "label-unique" => {
            cursor.assignment()?;
            snapshot.settings.label_unique = cursor.boolean()?;
        }
        "uuid-alias" => {
            cursor.assignment()?;
            snapshot.settings.uuid_alias = cursor.boolean()?;
        }
        "hide-device-name" => {
            cursor.assignment()?;
            snapshot.settings.hide_device_name = cursor.boolean()?;
        }
        "debug" => {
            cursor.assignment()?;
            snapshot.settings.debug = cursor.boolean()?;
        }
        "blink-led" => {
            cursor.assignment()?;
            snapshot.settings.blink_led = Some(cursor.led()?);
        }
        "expire-frequency" => {
            cursor.assignment()?;
            snapshot.settings.expire_freq = cursor.number()? as u32;
        }
        "expire-timeout" => {
            cursor.assignment()?;
            snapshot.settings.expire_timeout = cursor.number()?;
        }
        "options" => {
            let options = cursor.string()?;
            cursor.expect_if_or_for()?;
            let condition = cursor.condition_list()?;
            snapshot.rules.fs_options.insert(condition, options);
        }
        "alias" => {
            let name = cursor.string()?;
            cursor.expect_if_or_for()?;
            let condition = cursor.condition_list()?;
            snapshot.rules.aliases.insert(condition, name);
        }
        "no_automount" => {
            cursor.expect_if_or_for()?;
            let condition = cursor.condition_list()?;
            snapshot
                .rules
                .mount_options
                .insert(condition, EntryOptions::NO_AUTOMOUNT);
        }
        "use" => {
            let replacement = cursor.string()?;
            let instead = cursor.word()?;
            if instead != "instead" {
                let err_msg = format!("expected `instead`, found {:?}", instead);
                return Err(ParserError::Keyword(err_msg));
            }
            let original = cursor.string()?;

            snapshot.rules.fstype_replacements.push(
                crate::core::rules::FsTypeReplacement {
                    from: original,
                    to: replacement,
                },
            );
        }
        _ => {
            let err_msg = format!("unknown keyword {:?}", keyword);
            return Err(ParserError::Keyword(err_msg));
        }
    }

    if !cursor.at_end() {
        log::warn!("ignoring junk at end of line: {:?}", cursor.rest());
    }

    Ok(())
}

struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(line: &'a str) -> Cursor<'a> {
        Self { rest: line }
    }

    fn rest(&self) -> &'a str {
        self.rest
    }

    fn skip_space(&mut self) {
        self.rest = self.rest.trim_start_matches([' ', '\t']);
    }

    fn at_end(&mut self) -> bool {
        self.skip_space();

        self.rest.is_empty()
    }

    fn word(&mut self) -> Result<&'a str, ParserError> {
        self.skip_space();
        if self.rest.is_empty() {
            return Err(ParserError::Keyword("keyword missing".to_owned()));
        }

        let end = self
            .rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || "-_%".contains(c)))
            .unwrap_or(self.rest.len());
        if end == 0 {
            let err_msg = format!("not a keyword: {:?}", self.rest);
            return Err(ParserError::Keyword(err_msg));
        }

        let word = &self.rest[..end];
        self.rest = &self.rest[end..];
        Ok(word)
    }

    fn string(&mut self) -> Result<String, ParserError> {
        self.skip_space();
        if self.rest.is_empty() {
            return Err(ParserError::Value("expected string missing".to_owned()));
        }
        if !self.rest.starts_with('"') {
            return self.word().map(str::to_owned);
        }

        let mut value = String::new();
        let mut chars = self.rest[1..].char_indices();
        loop {
            let Some((at, c)) = chars.next() else {
                let err_msg = format!("no closing quote for string {:?}", value);
                return Err(ParserError::Value(err_msg));
            };

            match c {
                '"' => {
                    self.rest = &self.rest[1 + at + 1..];
                    return Ok(value);
                }
                '\\' if matches!(chars.clone().next(), Some((_, '"'))) => {
                    chars.next();
                    value.push('"');
                }
                _ => value.push(c),
            }
        }
    }

    fn assignment(&mut self) -> Result<(), ParserError> {
        self.skip_space();
        match self.rest.strip_prefix('=') {
            Some(rest) => {
                self.rest = rest;
                Ok(())
            }
            None => Err(ParserError::Assignment("missing `=`".to_owned())),
        }
    }

    fn boolean(&mut self) -> Result<bool, ParserError> {
        let word = self
            .word()
            .map_err(|_| ParserError::Boolean("boolean value missing".to_owned()))?;

        match word.to_ascii_lowercase().as_str() {
            "y" | "yes" | "t" | "true" | "on" | "1" => Ok(true),
            "n" | "no" | "f" | "false" | "off" | "0" => Ok(false),
            _ => {
                let err_msg = format!("bad boolean value {:?}", word);
                Err(ParserError::Boolean(err_msg))
            }
        }
    }

    fn number(&mut self) -> Result<u64, ParserError> {
        let word = self
            .word()
            .map_err(|_| ParserError::Number("expected number missing".to_owned()))?;

        match word.parse::<u64>() {
            Ok(value) if value > 0 => Ok(value),
            _ => {
                let err_msg = format!("bad number {:?}", word);
                Err(ParserError::Number(err_msg))
            }
        }
    }

    fn led(&mut self) -> Result<Led, ParserError> {
        let word = self
            .word()
            .map_err(|_| ParserError::Led("expected led name missing".to_owned()))?;

        match word.to_ascii_lowercase().as_str() {
            "num" | "numlock" => Ok(Led::Num),
            "cap" | "caps" | "capslock" => Ok(Led::Caps),
            "scr" | "scroll" | "scrlock" | "scrolllock" => Ok(Led::Scroll),
            _ => {
                let err_msg = format!("bad led name {:?}", word);
                Err(ParserError::Led(err_msg))
            }
        }
    }

    fn expect_if_or_for(&mut self) -> Result<(), ParserError> {
        let word = self
            .word()
            .map_err(|_| ParserError::Condition("missing `if` or `for`".to_owned()))?;

        if word == "if" || word == "for" {
            Ok(())
        } else {
            let err_msg = format!("missing `if` or `for`, found {:?}", word);
            Err(ParserError::Condition(err_msg))
        }
    }

    fn condition_atom(&mut self) -> Result<MatchAtom, ParserError> {
        let field = MatchField::from_str(self.word().map_err(|_| {
            ParserError::Condition("missing keyword for condition".to_owned())
        })?)?;

        self.skip_space();
        let op = if let Some(rest) = self.rest.strip_prefix("==") {
            self.rest = rest;
            MatchOp::Equals
        } else if let Some(rest) = self.rest.strip_prefix("!=") {
            self.rest = rest;
            MatchOp::Differs
        } else {
            return Err(ParserError::Condition(
                "bad match operator (expected `==` or `!=`)".to_owned(),
            ));
        };

        let value = self.string()?;
        Ok(MatchAtom::new(field, op, value))
    }

    fn condition_list(&mut self) -> Result<Condition, ParserError> {
        let mut atoms = Vec::new();

        loop {
            atoms.push(self.condition_atom()?);

            self.skip_space();
            if self.rest.is_empty() {
                break;
            }
            if let Some(rest) = self.rest.strip_prefix(',') {
                self.rest = rest;
                continue;
            }
            if let Some(rest) = self.rest.strip_prefix("&&") {
                self.rest = rest;
                continue;
            }

            return Err(ParserError::Condition(
                "expected `,` or `&&` or end of line after condition".to_owned(),
            ));
        }

        Ok(Condition::new(atoms))
    }
}

#[cfg(test)]
#[allow(unused_imports)]
mod tests {
    use super::*;
    use crate::core::matcher::DeviceFacts;
    use pretty_assertions::{assert_eq, assert_ne};

    #[test]
    fn parser_reads_scalar_settings() {
        let snapshot = parse(
            "debug = yes\n\
             hide-device-name = on\n\
             uuid-alias = true\n\
             label-unique = no\n\
             expire-frequency = 5\n\
             expire-timeout = 30\n\
             blink-led = scrolllock\n",
            "test.conf",
        );

        assert!(snapshot.settings.debug);
        assert!(snapshot.settings.hide_device_name);
        assert!(snapshot.settings.uuid_alias);
        assert!(!snapshot.settings.label_unique);
        assert_eq!(snapshot.settings.expire_freq, 5);
        assert_eq!(snapshot.settings.expire_timeout, 30);
        assert_eq!(snapshot.settings.blink_led, Some(Led::Scroll));
    }

    #[test]
    fn parser_keeps_defaults_for_missing_settings() {
        let snapshot = parse("", "test.conf");

        assert_eq!(snapshot.settings.expire_freq, 2);
        assert_eq!(snapshot.settings.expire_timeout, 4);
        assert!(snapshot.settings.scan_fstab);
        assert!(snapshot.settings.model_alias);
        assert!(!snapshot.settings.uuid_alias);
    }

    #[test]
    fn parser_reads_an_options_rule() {
        let snapshot = parse("options \"noatime\" if vendor == \"Acme\"\n", "test.conf");

        let facts = DeviceFacts {
            device: "/dev/sdd1",
            vendor: Some("Acme"),
            ..DeviceFacts::default()
        };
        let actual = snapshot.rules.fs_options.find_first(&facts).cloned();
        let expected = Some("noatime".to_owned());
        assert_eq!(actual, expected);
    }

    #[test]
    fn parser_reads_condition_lists_with_both_separators() {
        let snapshot = parse(
            "alias \"backup%P\" for vendor == \"Acme\", model != \"Old\" && fstype == \"ext4\"\n",
            "test.conf",
        );

        let matching = DeviceFacts {
            device: "/dev/sdd1",
            vendor: Some("Acme"),
            model: Some("New"),
            fstype: Some("ext4"),
            ..DeviceFacts::default()
        };
        assert_eq!(
            snapshot.rules.aliases.find_first(&matching).cloned(),
            Some("backup%P".to_owned())
        );

        let wrong_model = DeviceFacts {
            model: Some("Old"),
            ..matching
        };
        assert_eq!(snapshot.rules.aliases.find_first(&wrong_model), None);
    }

    #[test]
    fn parser_reads_no_automount_rules() {
        let snapshot = parse("no_automount if device == \"/dev/sdz1\"\n", "test.conf");

        let facts = DeviceFacts {
            device: "/dev/sdz1",
            ..DeviceFacts::default()
        };
        let actual = snapshot.rules.mount_options.find_all_union(&facts);
        let expected = EntryOptions::NO_AUTOMOUNT;
        assert_eq!(actual, expected);
    }

    #[test]
    fn parser_reads_fstype_replacements() {
        let snapshot = parse("use \"ntfs-3g\" instead \"ntfs\"\n", "test.conf");

        let actual = snapshot.rules.replacement_for("ntfs");
        let expected = Some("ntfs-3g");
        assert_eq!(actual, expected);
    }

    #[test]
    fn parser_unescapes_quoted_strings() {
        let snapshot = parse(
            "alias \"my \\\"disk\\\"\" if label == \"X\"\n",
            "test.conf",
        );

        let facts = DeviceFacts {
            device: "/dev/sde1",
            label: Some("X"),
            ..DeviceFacts::default()
        };
        let actual = snapshot.rules.aliases.find_first(&facts).cloned();
        let expected = Some("my \"disk\"".to_owned());
        assert_eq!(actual, expected);
    }

    #[test]
    fn parser_skips_bad_lines_but_keeps_good_ones() {
        let snapshot = parse(
            "frobnicate = yes\n\
             expire-frequency = 0\n\
             debug = maybe\n\
             uuid-alias = yes\n",
            "test.conf",
        );

        // Bad keyword, zero number and bad boolean are all skipped.
        assert_eq!(snapshot.settings.expire_freq, 2);
        assert!(!snapshot.settings.debug);
        assert!(snapshot.settings.uuid_alias);
    }

    #[test]
    fn parser_skips_comment_lines() {
        let snapshot = parse(
            "# a comment\n\
             ; another comment\n\
             debug = yes\n",
            "test.conf",
        );

        assert!(snapshot.settings.debug);
    }

    #[test]
    fn parser_boolean_spellings() {
        for (text, expected) in [
            ("y", true),
            ("YES", true),
            ("t", true),
            ("True", true),
            ("on", true),
            ("1", true),
            ("n", false),
            ("No", false),
            ("f", false),
            ("false", false),
            ("OFF", false),
            ("0", false),
        ] {
            let snapshot = parse(&format!("debug = {}\n", text), "test.conf");
            assert_eq!(snapshot.settings.debug, expected, "spelling {:?}", text);
        }
    }
}
