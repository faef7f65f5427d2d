//! Typed access to the string attributes of a scene element.
//!
//! Scene files keep every attribute as a string (`x_stat = "10,200"`);
//! layers and effects pull typed values out through [`Attrs`], which
//! names the element and key in every error it raises.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::color::Rgba;
use crate::error::{PyrffectError, PyrffectResult};

/// A borrowed view over one element's attributes.
#[derive(Debug, Clone, Copy)]
pub struct Attrs<'a> {
    owner: &'a str,
    map: &'a BTreeMap<String, String>,
}

impl<'a> Attrs<'a> {
    /// `owner` is only used to make error messages point at the right element.
    pub fn new(owner: &'a str, map: &'a BTreeMap<String, String>) -> Self {
        Self { owner, map }
    }

    pub fn owner(&self) -> &'a str {
        self.owner
    }

    /// Raw string value, if present.
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.map.get(key).map(|s| s.trim())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Raw string value, or a configuration error if absent.
    pub fn require(&self, key: &str) -> PyrffectResult<&'a str> {
        self.get(key).ok_or_else(|| {
            PyrffectError::config(format!(
                "{}: missing required attribute '{}'",
                self.owner, key
            ))
        })
    }

    /// Parse a single scalar.
    pub fn parse<T: FromStr>(&self, key: &str) -> PyrffectResult<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| self.invalid(key, raw)),
        }
    }

    /// Parse a single scalar, falling back to `default` when absent.
    pub fn parse_or<T: FromStr>(&self, key: &str, default: T) -> PyrffectResult<T> {
        Ok(self.parse(key)?.unwrap_or(default))
    }

    pub fn number(&self, key: &str) -> PyrffectResult<Option<f64>> {
        self.parse::<f64>(key)
    }

    pub fn number_or(&self, key: &str, default: f64) -> PyrffectResult<f64> {
        self.parse_or(key, default)
    }

    /// `"true"`, `"false"`, `"1"` or `"0"`.
    pub fn flag_or(&self, key: &str, default: bool) -> PyrffectResult<bool> {
        match self.get(key) {
            None => Ok(default),
            Some("true") | Some("1") => Ok(true),
            Some("false") | Some("0") => Ok(false),
            Some(raw) => Err(self.invalid(key, raw)),
        }
    }

    /// Comma separated list of exactly `N` numbers.
    pub fn numbers<const N: usize>(&self, key: &str) -> PyrffectResult<Option<[f64; N]>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => {
                let values = parse_list(raw).ok_or_else(|| self.invalid(key, raw))?;
                let arr: [f64; N] = values.try_into().map_err(|_| {
                    PyrffectError::config(format!(
                        "{}: attribute '{}' = '{}' needs exactly {} values",
                        self.owner, key, raw, N
                    ))
                })?;
                Ok(Some(arr))
            }
        }
    }

    /// `"a,b"`
    pub fn pair(&self, key: &str) -> PyrffectResult<Option<(f64, f64)>> {
        Ok(self.numbers::<2>(key)?.map(|[a, b]| (a, b)))
    }

    /// `"a,b,c"`
    pub fn triple(&self, key: &str) -> PyrffectResult<Option<(f64, f64, f64)>> {
        Ok(self.numbers::<3>(key)?.map(|[a, b, c]| (a, b, c)))
    }

    /// `"r,g,b"` or `"r,g,b,a"`, alpha in `[0, 1]` and defaulting to opaque.
    pub fn color(&self, key: &str) -> PyrffectResult<Option<Rgba>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => parse_color(raw).map(Some).ok_or_else(|| self.invalid(key, raw)),
        }
    }

    /// Semicolon separated colors: `"255,0,0;0,0,255,0.5"`.
    pub fn color_list(&self, key: &str) -> PyrffectResult<Option<Vec<Rgba>>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .split(';')
                .filter(|c| !c.trim().is_empty())
                .map(|c| parse_color(c).ok_or_else(|| self.invalid(key, raw)))
                .collect::<PyrffectResult<Vec<_>>>()
                .map(Some),
        }
    }

    fn invalid(&self, key: &str, raw: &str) -> PyrffectError {
        PyrffectError::config(format!(
            "{}: invalid value '{}' for attribute '{}'",
            self.owner, raw, key
        ))
    }
}

fn parse_list(raw: &str) -> Option<Vec<f64>> {
    raw.split(',')
        .map(|v| v.trim().parse::<f64>().ok())
        .collect()
}

fn parse_color(raw: &str) -> Option<Rgba> {
    match parse_list(raw)?.as_slice() {
        [r, g, b] => Some(Rgba::rgb(*r as f32, *g as f32, *b as f32)),
        [r, g, b, a] => Some(Rgba::new(*r as f32, *g as f32, *b as f32, *a as f32)),
        _ => None,
    }
}
