//! Tile URL construction.
//!
//! Templates substitute `{x}`, `{y}`, `{z}` and `{s}`, in any case and
//! optionally written `${x}`. The subdomain placeholder can carry its own
//! list: `{s:abc}`, `{a-c}` and `{a,b,c}` are equivalent.

use crate::tiles::tile::TileIndex;
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// Anything that can produce a tile URL for a source index
pub trait TileSource: Send + Sync {
    fn url(&self, index: &TileIndex, subdomains: &[String]) -> String;
}

impl<F> TileSource for F
where
    F: Fn(&TileIndex, &[String]) -> String + Send + Sync,
{
    fn url(&self, index: &TileIndex, subdomains: &[String]) -> String {
        self(index, subdomains)
    }
}

/// Split a subdomain option: comma-separated when it contains a comma,
/// otherwise one subdomain per character
pub fn parse_subdomains(subdomains: &str) -> Vec<String> {
    if subdomains.contains(',') {
        subdomains.split(',').map(str::to_string).collect()
    } else {
        subdomains.chars().map(String::from).collect()
    }
}

/// Deterministic subdomain for a tile, spreading neighbours across servers
pub fn pick_subdomain<'a>(index: &TileIndex, subdomains: &'a [String]) -> &'a str {
    if subdomains.is_empty() {
        return "";
    }
    let sum = index.x + index.y + index.level as i64;
    let slot = sum.rem_euclid(subdomains.len() as i64) as usize;
    &subdomains[slot]
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    X,
    Y,
    Z,
    Subdomain,
}

/// Classify the inside of a `{...}` group
fn placeholder(content: &str) -> Option<(Segment, Option<Vec<String>>)> {
    match content {
        "x" | "X" => return Some((Segment::X, None)),
        "y" | "Y" => return Some((Segment::Y, None)),
        "z" | "Z" => return Some((Segment::Z, None)),
        "s" | "S" => return Some((Segment::Subdomain, None)),
        _ => {}
    }
    if let Some(list) = content
        .strip_prefix("s:")
        .or_else(|| content.strip_prefix("S:"))
    {
        if !list.is_empty() {
            return Some((Segment::Subdomain, Some(list.chars().map(String::from).collect())));
        }
    }
    let chars: Vec<char> = content.chars().collect();
    if chars.len() == 3 && chars[1] == '-' && chars[0] != '-' && chars[2] != '-' {
        let (start, end) = (chars[0].min(chars[2]), chars[0].max(chars[2]));
        let range = (start..=end).map(String::from).collect();
        return Some((Segment::Subdomain, Some(range)));
    }
    if content.contains(',') {
        let parts: Vec<String> = content.split(',').map(str::to_string).collect();
        if parts.iter().all(|part| !part.is_empty()) {
            return Some((Segment::Subdomain, Some(parts)));
        }
    }
    None
}

/// A parsed URL template
#[derive(Debug, Clone, PartialEq)]
pub struct UrlTemplate {
    raw: String,
    segments: Vec<Segment>,
    subdomains: Option<Vec<String>>,
}

impl UrlTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        if template.trim().is_empty() {
            return Err(Error::Url("empty url template".to_string()));
        }

        let mut segments = Vec::new();
        let mut subdomains = None;
        let mut literal = String::new();
        let mut rest = template;

        while !rest.is_empty() {
            let dollar = rest.starts_with("${");
            let open = if dollar { 1 } else { 0 };
            if rest[open..].starts_with('{') {
                if let Some(close) = rest[open + 1..].find('}') {
                    let content = &rest[open + 1..open + 1 + close];
                    if let Some((segment, list)) = placeholder(content) {
                        if !literal.is_empty() {
                            segments.push(Segment::Literal(std::mem::take(&mut literal)));
                        }
                        if subdomains.is_none() {
                            subdomains = list;
                        }
                        segments.push(segment);
                        rest = &rest[open + close + 2..];
                        continue;
                    }
                }
            }
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                literal.push(c);
            }
            rest = chars.as_str();
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            raw: template.to_string(),
            segments,
            subdomains,
        })
    }

    /// Old-style `base_url`: `{base}/{z}/{x}/{y}.{image_format}`
    pub fn from_base_url(base_url: &str, image_format: &str) -> Result<Self> {
        let mut url = base_url.to_string();
        if !url.ends_with('/') {
            url.push('/');
        }
        let format = if image_format.is_empty() { "png" } else { image_format };
        Self::parse(&format!("{url}{{z}}/{{x}}/{{y}}.{format}"))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Subdomains embedded in the template, which win over the layer's own
    pub fn embedded_subdomains(&self) -> Option<&[String]> {
        self.subdomains.as_deref()
    }

    pub fn render(&self, index: &TileIndex, subdomains: &[String]) -> String {
        let subdomains = self.subdomains.as_deref().unwrap_or(subdomains);
        let mut url = String::with_capacity(self.raw.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => url.push_str(text),
                Segment::X => url.push_str(&index.x.to_string()),
                Segment::Y => url.push_str(&index.y.to_string()),
                Segment::Z => url.push_str(&index.level.to_string()),
                Segment::Subdomain => url.push_str(pick_subdomain(index, subdomains)),
            }
        }
        url
    }
}

impl TileSource for UrlTemplate {
    fn url(&self, index: &TileIndex, subdomains: &[String]) -> String {
        self.render(index, subdomains)
    }
}

/// Where tile URLs come from: a template or caller code
#[derive(Clone)]
pub enum TileUrl {
    Template(UrlTemplate),
    Computed(Arc<dyn TileSource>),
}

impl TileUrl {
    pub fn template(template: &str) -> Result<Self> {
        UrlTemplate::parse(template).map(TileUrl::Template)
    }

    pub fn computed<S: TileSource + 'static>(source: S) -> Self {
        TileUrl::Computed(Arc::new(source))
    }

    pub fn resolve(&self, source: &TileIndex, subdomains: &[String]) -> String {
        match self {
            TileUrl::Template(template) => template.render(source, subdomains),
            TileUrl::Computed(compute) => compute.url(source, subdomains),
        }
    }

    /// The template text, `None` for computed urls
    pub fn as_template(&self) -> Option<&str> {
        match self {
            TileUrl::Template(template) => Some(template.as_str()),
            TileUrl::Computed(_) => None,
        }
    }

    /// Two computed urls are the same only if they share the closure
    pub fn same_as(&self, other: &TileUrl) -> bool {
        match (self, other) {
            (TileUrl::Template(a), TileUrl::Template(b)) => a.as_str() == b.as_str(),
            (TileUrl::Computed(a), TileUrl::Computed(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for TileUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileUrl::Template(template) => {
                f.debug_tuple("Template").field(&template.as_str()).finish()
            }
            TileUrl::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subs(list: &str) -> Vec<String> {
        parse_subdomains(list)
    }

    #[test]
    fn test_osm_template() {
        let template =
            UrlTemplate::parse("https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png").unwrap();
        let url = template.render(&TileIndex::new(3, 4, 2), &subs("abc"));
        // (4 + 2 + 3) mod 3 = 0
        assert_eq!(url, "https://a.tile.openstreetmap.org/3/4/2.png");
        let url = template.render(&TileIndex::new(3, 5, 2), &subs("abc"));
        assert_eq!(url, "https://b.tile.openstreetmap.org/3/5/2.png");
    }

    #[test]
    fn test_placeholders_any_case_with_dollar() {
        let template = UrlTemplate::parse("http://host/${Z}/{X}/${y}").unwrap();
        assert_eq!(template.render(&TileIndex::new(1, 0, 1), &[]), "http://host/1/0/1");
    }

    #[test]
    fn test_embedded_subdomain_forms_agree() {
        let index = TileIndex::new(2, 1, 1);
        let expected = "http://b.host/2";
        for form in [
            "http://{s:abc}.host/{z}",
            "http://{a-c}.host/{z}",
            "http://{a,b,c}.host/{z}",
        ] {
            let template = UrlTemplate::parse(form).unwrap();
            assert_eq!(template.render(&index, &subs("xyz")), expected, "{form}");
        }
        let multi = UrlTemplate::parse("http://{tile1,tile2}.host/{x}").unwrap();
        assert_eq!(multi.embedded_subdomains().unwrap(), ["tile1", "tile2"]);
    }

    #[test]
    fn test_negative_index_subdomain() {
        let template = UrlTemplate::parse("{s}").unwrap();
        assert_eq!(template.render(&TileIndex::new(0, -2, 0), &subs("abc")), "b");
    }

    #[test]
    fn test_unknown_braces_are_literal() {
        let template = UrlTemplate::parse("http://host/{layer}/{z}").unwrap();
        assert_eq!(template.render(&TileIndex::new(4, 0, 0), &[]), "http://host/{layer}/4");
    }

    #[test]
    fn test_base_url() {
        let template = UrlTemplate::from_base_url("http://tiles.example.com", "jpeg").unwrap();
        assert_eq!(template.as_str(), "http://tiles.example.com/{z}/{x}/{y}.jpeg");
        assert!(matches!(UrlTemplate::parse("  "), Err(Error::Url(_))));
    }

    #[test]
    fn test_parse_subdomains() {
        assert_eq!(parse_subdomains("abc"), vec!["a", "b", "c"]);
        assert_eq!(parse_subdomains("t1,t2"), vec!["t1", "t2"]);
    }

    #[test]
    fn test_computed_url() {
        let url = TileUrl::computed(|index: &TileIndex, _: &[String]| format!("gen:{index}"));
        assert_eq!(url.resolve(&TileIndex::new(1, 2, 3), &[]), "gen:1_3_2_0");
        assert!(url.same_as(&url.clone()));
        assert!(url.as_template().is_none());
    }
}
