//! Compile-time feature switches and their permutations.
//!
//! Switches are found by a textual scan of the unprocessed source: any `#if`
//! line mentioning `ENUM_<Type>_<Value>` or `OPTION_<Name>` tokens. The
//! permutation ids produced here name compiled binaries, so the order must
//! only depend on the source text.
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Options double the permutation count each; past this many the set is
/// refused rather than enumerated.
pub const MAX_OPTIONS: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
    pub value: String,
    pub flag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PermutationSwitch {
    Option {
        name: String,
        flag: String,
    },
    EnumFamily {
        type_name: String,
        values: Vec<EnumValue>,
    },
}

/// Switches in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Switches(pub Vec<PermutationSwitch>);
impl Switches {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn options(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().filter_map(|s| match s {
            PermutationSwitch::Option { name, flag } => Some((name.as_str(), flag.as_str())),
            _ => None,
        })
    }
    pub fn enum_families(&self) -> impl Iterator<Item = (&str, &[EnumValue])> {
        self.0.iter().filter_map(|s| match s {
            PermutationSwitch::EnumFamily { type_name, values } => {
                Some((type_name.as_str(), values.as_slice()))
            }
            _ => None,
        })
    }

    fn add_option(&mut self, name: String, flag: &str) {
        let exists = self.options().any(|(x, _)| x == name);
        if !exists {
            self.0.push(PermutationSwitch::Option {
                name,
                flag: flag.to_owned(),
            });
        }
    }
    fn add_enum_value(&mut self, type_name: String, value: String, flag: &str) {
        let family = self.0.iter_mut().find_map(|s| match s {
            PermutationSwitch::EnumFamily { type_name: t, values } if *t == type_name => {
                Some(values)
            }
            _ => None,
        });
        let entry = EnumValue {
            value,
            flag: flag.to_owned(),
        };
        match family {
            Some(values) => {
                if !values.iter().any(|v| v.value == entry.value) {
                    values.push(entry);
                }
            }
            None => self.0.push(PermutationSwitch::EnumFamily {
                type_name,
                values: vec![entry],
            }),
        }
    }
}

/// Capitalizes every letter that follows a non-letter and lowercases the
/// rest, so `mode2d` becomes `Mode2D`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

pub fn discover(source: &str) -> Switches {
    let mut out = Switches::default();
    for line in source.lines() {
        if !line.trim_start().starts_with("#if") {
            continue;
        }
        let words = line
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|w| !w.is_empty());
        for word in words {
            let segments = word.split('_').collect::<Vec<_>>();
            match segments.as_slice() {
                ["ENUM", type_name, values @ ..] if !values.is_empty() => {
                    let value = values.iter().map(|x| title_case(x)).collect::<String>();
                    out.add_enum_value(title_case(type_name), value, word);
                }
                ["OPTION", first, rest @ ..] => {
                    let name = std::iter::once(first.to_lowercase())
                        .chain(rest.iter().map(|x| title_case(x)))
                        .collect::<String>();
                    out.add_option(name, word);
                }
                _ => {}
            }
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentKind {
    Option,
    Enum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(rename = "type")]
    pub kind: AssignmentKind,
    pub variable_name: String,
    pub value: String,
    pub flag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permutation {
    pub id: String,
    pub assignments: Vec<Assignment>,
    pub active_defines: Vec<String>,
}

/// Every true/false combination of the options, counting up in binary with
/// option `i` on bit `i`.
pub fn option_permute(switches: &Switches) -> Result<Vec<Vec<Assignment>>> {
    let options = switches.options().collect::<Vec<_>>();
    if options.len() > MAX_OPTIONS {
        bail!(
            "{} option switches exceed the limit of {}",
            options.len(),
            MAX_OPTIONS
        );
    }
    let combinations = (0..1usize << options.len())
        .map(|counter| {
            options
                .iter()
                .enumerate()
                .map(|(bit, &(name, flag))| Assignment {
                    kind: AssignmentKind::Option,
                    variable_name: name.to_owned(),
                    value: (counter & (1 << bit) != 0).to_string(),
                    flag: flag.to_owned(),
                })
                .collect()
        })
        .collect();
    Ok(combinations)
}

/// Cartesian product of the enum families, the first family varying
/// slowest.
pub fn enum_permute(switches: &Switches) -> Vec<Vec<Assignment>> {
    let mut out = vec![Vec::new()];
    for (type_name, values) in switches.enum_families() {
        let mut next = Vec::with_capacity(out.len() * values.len());
        for prefix in &out {
            for v in values {
                let mut combination: Vec<Assignment> = prefix.clone();
                combination.push(Assignment {
                    kind: AssignmentKind::Enum,
                    variable_name: type_name.to_lowercase(),
                    value: format!("{}::{}", title_case(type_name), v.value),
                    flag: v.flag.clone(),
                });
                next.push(combination);
            }
        }
        out = next;
    }
    out
}

/// Numbers every option/enum combination, option-major. A source without
/// switches has no permutations.
pub fn permute(switches: &Switches) -> Result<Vec<Permutation>> {
    let options = option_permute(switches)?;
    let enums = enum_permute(switches);
    let mut out = Vec::new();
    for o in &options {
        for e in &enums {
            if o.is_empty() && e.is_empty() {
                continue;
            }
            let assignments = o.iter().chain(e.iter()).cloned().collect::<Vec<_>>();
            let active_defines = assignments
                .iter()
                .filter(|a| a.kind == AssignmentKind::Enum || a.value == "true")
                .map(|a| a.flag.clone())
                .collect();
            out.push(Permutation {
                id: format!("{:03}", out.len()),
                assignments,
                active_defines,
            });
        }
    }
    Ok(out)
}
