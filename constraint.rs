use crate::error::{Error, Result};
use crate::lexer::{self, Atom, Expr};
use crate::models::{Media, MediaType};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, skip_serializing_none, OneOrMany};

/// Characters that switch free-text search over to a boolean expression.
const EXPRESSION_CHARS: &[char] = &['|', '&', '(', ')', '!'];

/// Declarative filter over the catalog. Every present field must hold.
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Constraint {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub none: Vec<String>,
    #[serde_as(as = "OneOrMany<_>")]
    #[serde(rename = "type", default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<MediaType>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub path: Option<String>,
    pub tag_lexer: Option<String>,
    pub general_lexer: Option<String>,
    pub keyword_search: Option<String>,
    /// Hash of a media whose directory selects the result.
    pub folder: Option<String>,
}

impl Constraint {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::Validation(e.to_string()))
    }

    /// Builds the constraint for a search box: text with operator characters
    /// is a general expression, anything else a keyword search. Blank text
    /// is refused rather than matching everything.
    pub fn from_search_text(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(Error::Validation("search text is empty".into()));
        }
        Ok(if text.contains(EXPRESSION_CHARS) {
            Constraint {
                general_lexer: Some(text.to_string()),
                ..Default::default()
            }
        } else {
            Constraint {
                keyword_search: Some(text.to_string()),
                ..Default::default()
            }
        })
    }

    pub fn folder(hash: impl Into<String>) -> Self {
        Constraint {
            folder: Some(hash.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Constraint::default()
    }

    /// Validates every field up front so evaluation cannot fail midway.
    pub fn compile(&self) -> Result<CompiledConstraint> {
        let tag_expr = match &self.tag_lexer {
            Some(text) => Some(lexer::parse(text)?.try_map(&mut |atom: Atom| Ok(atom.name))?),
            None => None,
        };
        let general_expr = match &self.general_lexer {
            Some(text) => Some(lexer::parse(text)?.try_map(&mut Predicate::from_atom)?),
            None => None,
        };
        Ok(CompiledConstraint {
            all: self.all.clone(),
            any: self.any.clone(),
            none: self.none.clone(),
            types: self.types.clone(),
            width: self.width,
            height: self.height,
            artist: compile_pattern("artist", self.artist.as_deref())?,
            album: compile_pattern("album", self.album.as_deref())?,
            title: compile_pattern("title", self.title.as_deref())?,
            path: compile_pattern("path", self.path.as_deref())?,
            tag_expr,
            general_expr,
            keyword: self.keyword_search.as_deref().map(str::to_lowercase),
            folder: self.folder.clone(),
        })
    }
}

fn compile_pattern(field: &str, pattern: Option<&str>) -> Result<Option<Regex>> {
    pattern
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map_err(|e| Error::Validation(format!("invalid {field} pattern: {e}")))
        })
        .transpose()
}

/// A named test usable as an atom in a general expression.
#[derive(Debug, Clone)]
pub enum Predicate {
    Tag(String),
    Type(MediaType),
    Artist(Regex),
    Album(Regex),
    Title(Regex),
    Path(Regex),
    Keyword(String),
    Width(u32),
    Height(u32),
}

impl Predicate {
    /// `key:value` atoms are predicates; bare atoms are tags.
    fn from_atom(atom: Atom) -> Result<Self> {
        let Some((key, value)) = atom.name.split_once(':') else {
            return Ok(Predicate::Tag(atom.name));
        };
        let value = value.trim();
        let at = atom.position;
        let pattern = |field: &str| {
            RegexBuilder::new(value)
                .case_insensitive(true)
                .build()
                .map_err(|e| Error::parse(at, format!("invalid {field} pattern: {e}")))
        };
        let whole_number = |field: &str| {
            value
                .parse::<u32>()
                .map_err(|_| Error::parse(at, format!("{field} needs a whole number, got '{value}'")))
        };
        Ok(match key.trim() {
            "tag" => Predicate::Tag(value.to_string()),
            "type" => Predicate::Type(
                value
                    .parse()
                    .map_err(|_| Error::parse(at, format!("unknown media type '{value}'")))?,
            ),
            "artist" => Predicate::Artist(pattern("artist")?),
            "album" => Predicate::Album(pattern("album")?),
            "title" => Predicate::Title(pattern("title")?),
            "path" => Predicate::Path(pattern("path")?),
            "keyword" => Predicate::Keyword(value.to_lowercase()),
            "width" => Predicate::Width(whole_number("width")?),
            "height" => Predicate::Height(whole_number("height")?),
            other => return Err(Error::parse(at, format!("unknown predicate '{other}'"))),
        })
    }

    fn holds(&self, media: &Media) -> bool {
        match self {
            Predicate::Tag(tag) => media.has_tag(tag),
            Predicate::Type(media_type) => media.media_type == *media_type,
            Predicate::Artist(re) => metadata_matches(media, re, |m| m.artist.as_deref()),
            Predicate::Album(re) => metadata_matches(media, re, |m| m.album.as_deref()),
            Predicate::Title(re) => metadata_matches(media, re, |m| m.title.as_deref()),
            Predicate::Path(re) => re.is_match(&media.path),
            Predicate::Keyword(keyword) => keyword_matches(media, keyword),
            Predicate::Width(min) => dimension(media, |m| m.width).is_some_and(|w| w >= *min),
            Predicate::Height(min) => dimension(media, |m| m.height).is_some_and(|h| h >= *min),
        }
    }
}

fn metadata_matches<F>(media: &Media, re: &Regex, field: F) -> bool
where
    F: Fn(&crate::models::Metadata) -> Option<&str>,
{
    media
        .metadata
        .as_ref()
        .and_then(field)
        .is_some_and(|value| re.is_match(value))
}

fn dimension<F>(media: &Media, field: F) -> Option<u32>
where
    F: Fn(&crate::models::Metadata) -> Option<u32>,
{
    media.metadata.as_ref().and_then(field)
}

/// Case-insensitive substring test against the path and text metadata.
/// `keyword` must already be lowercase.
fn keyword_matches(media: &Media, keyword: &str) -> bool {
    if media.path.to_lowercase().contains(keyword) {
        return true;
    }
    let Some(meta) = &media.metadata else {
        return false;
    };
    [&meta.artist, &meta.album, &meta.title]
        .into_iter()
        .flatten()
        .any(|value| value.to_lowercase().contains(keyword))
}

/// A validated constraint, ready to test media against.
#[derive(Debug, Clone)]
pub struct CompiledConstraint {
    all: Vec<String>,
    any: Vec<String>,
    none: Vec<String>,
    types: Vec<MediaType>,
    width: Option<u32>,
    height: Option<u32>,
    artist: Option<Regex>,
    album: Option<Regex>,
    title: Option<Regex>,
    path: Option<Regex>,
    tag_expr: Option<Expr<String>>,
    general_expr: Option<Expr<Predicate>>,
    keyword: Option<String>,
    folder: Option<String>,
}

impl CompiledConstraint {
    pub fn folder(&self) -> Option<&str> {
        self.folder.as_deref()
    }

    /// Tests every field except `folder`, which needs the whole catalog.
    pub fn matches(&self, media: &Media) -> bool {
        if !self.all.iter().all(|tag| media.has_tag(tag)) {
            return false;
        }
        if !self.any.is_empty() && !self.any.iter().any(|tag| media.has_tag(tag)) {
            return false;
        }
        if self.none.iter().any(|tag| media.has_tag(tag)) {
            return false;
        }
        if !self.types.is_empty() && !self.types.contains(&media.media_type) {
            return false;
        }
        if let Some(min) = self.width {
            if !dimension(media, |m| m.width).is_some_and(|w| w >= min) {
                return false;
            }
        }
        if let Some(min) = self.height {
            if !dimension(media, |m| m.height).is_some_and(|h| h >= min) {
                return false;
            }
        }
        if let Some(re) = &self.artist {
            if !metadata_matches(media, re, |m| m.artist.as_deref()) {
                return false;
            }
        }
        if let Some(re) = &self.album {
            if !metadata_matches(media, re, |m| m.album.as_deref()) {
                return false;
            }
        }
        if let Some(re) = &self.title {
            if !metadata_matches(media, re, |m| m.title.as_deref()) {
                return false;
            }
        }
        if let Some(re) = &self.path {
            if !re.is_match(&media.path) {
                return false;
            }
        }
        if let Some(expr) = &self.tag_expr {
            if !expr.eval(&|tag: &String| media.has_tag(tag)) {
                return false;
            }
        }
        if let Some(expr) = &self.general_expr {
            if !expr.eval(&|predicate: &Predicate| predicate.holds(media)) {
                return false;
            }
        }
        if let Some(keyword) = &self.keyword {
            if !keyword_matches(media, keyword) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;

    fn media(path: &str, media_type: MediaType, tags: &[&str]) -> Media {
        Media {
            hash: path.into(),
            path: path.into(),
            rotation: 0,
            media_type,
            hash_date: 0,
            corrupted: false,
            transcode: false,
            metadata: None,
            tags: {
                let mut tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
                tags.sort();
                tags
            },
        }
    }

    fn with_metadata(mut media: Media, metadata: Metadata) -> Media {
        media.metadata = Some(metadata);
        media
    }

    #[test]
    fn json_shape_uses_client_keys() {
        let constraint = Constraint::from_json(
            r#"{"all":["x"],"type":"still","tagLexer":"x&!y","keywordSearch":"cat","width":640}"#,
        )
        .unwrap();
        assert_eq!(constraint.all, ["x"]);
        assert_eq!(constraint.types, [MediaType::Still]);
        assert_eq!(constraint.tag_lexer.as_deref(), Some("x&!y"));
        assert_eq!(constraint.keyword_search.as_deref(), Some("cat"));

        let many = Constraint::from_json(r#"{"type":["gif","video"]}"#).unwrap();
        assert_eq!(many.types, [MediaType::Gif, MediaType::Video]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            Constraint::from_json(r#"{"colour":"red"}"#),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            Constraint::from_json("not json"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn search_text_picks_expression_or_keyword() {
        let expr = Constraint::from_search_text("cat & !dog").unwrap();
        assert_eq!(expr.general_lexer.as_deref(), Some("cat & !dog"));
        assert!(expr.keyword_search.is_none());
        let keyword = Constraint::from_search_text("holiday 2019").unwrap();
        assert_eq!(keyword.keyword_search.as_deref(), Some("holiday 2019"));
    }

    #[test]
    fn blank_search_text_is_refused() {
        for text in ["", "   ", "\t\n"] {
            assert!(
                matches!(Constraint::from_search_text(text), Err(Error::Validation(_))),
                "{text:?}"
            );
        }
    }

    #[test]
    fn tag_sets_combine_with_and() {
        let constraint = Constraint {
            all: vec!["x".into()],
            any: vec!["y".into(), "z".into()],
            none: vec!["w".into()],
            ..Default::default()
        }
        .compile()
        .unwrap();
        assert!(constraint.matches(&media("/a", MediaType::Still, &["x", "z"])));
        assert!(!constraint.matches(&media("/a", MediaType::Still, &["x"])));
        assert!(!constraint.matches(&media("/a", MediaType::Still, &["x", "y", "w"])));
        assert!(!constraint.matches(&media("/a", MediaType::Still, &["y"])));
    }

    #[test]
    fn resolution_floor_needs_both_dimensions() {
        let constraint = Constraint {
            width: Some(1280),
            height: Some(720),
            ..Default::default()
        }
        .compile()
        .unwrap();
        let hd = with_metadata(
            media("/hd.mp4", MediaType::Video, &[]),
            Metadata {
                width: Some(1920),
                height: Some(1080),
                ..Default::default()
            },
        );
        let wide = with_metadata(
            media("/wide.mp4", MediaType::Video, &[]),
            Metadata {
                width: Some(1920),
                height: Some(400),
                ..Default::default()
            },
        );
        assert!(constraint.matches(&hd));
        assert!(!constraint.matches(&wide));
        assert!(!constraint.matches(&media("/bare.mp4", MediaType::Video, &[])));
    }

    #[test]
    fn metadata_patterns_are_case_insensitive() {
        let constraint = Constraint {
            artist: Some("beat|stone".into()),
            path: Some("music/".into()),
            ..Default::default()
        }
        .compile()
        .unwrap();
        let song = with_metadata(
            media("/Music/one.mp4", MediaType::Video, &[]),
            Metadata {
                artist: Some("The Beatles".into()),
                ..Default::default()
            },
        );
        assert!(constraint.matches(&song));
        assert!(!constraint.matches(&media("/Music/two.mp4", MediaType::Video, &[])));
    }

    #[test]
    fn invalid_pattern_is_a_validation_error() {
        let constraint = Constraint {
            title: Some("(unclosed".into()),
            ..Default::default()
        };
        assert!(matches!(constraint.compile(), Err(Error::Validation(_))));
    }

    #[test]
    fn general_lexer_mixes_tags_and_predicates() {
        let constraint = Constraint {
            general_lexer: Some("(type:video | cats) & !keyword:draft".into()),
            ..Default::default()
        }
        .compile()
        .unwrap();
        assert!(constraint.matches(&media("/clips/a.mp4", MediaType::Video, &[])));
        assert!(constraint.matches(&media("/pics/a.jpg", MediaType::Still, &["cats"])));
        assert!(!constraint.matches(&media("/DRAFT/a.mp4", MediaType::Video, &[])));
        assert!(!constraint.matches(&media("/pics/b.jpg", MediaType::Still, &["dogs"])));
    }

    #[test]
    fn general_lexer_rejects_bad_predicates() {
        for (text, position) in [("cats & colour:red", 7), ("width:big", 0), ("type:audio", 0)] {
            let constraint = Constraint {
                general_lexer: Some(text.into()),
                ..Default::default()
            };
            match constraint.compile() {
                Err(Error::Parse { position: at, .. }) => assert_eq!(at, position, "{text}"),
                other => panic!("expected parse error for {text}, got {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_tags_are_simply_absent() {
        let constraint = Constraint {
            tag_lexer: Some("never-used | x".into()),
            none: vec!["also-never-used".into()],
            ..Default::default()
        }
        .compile()
        .unwrap();
        assert!(constraint.matches(&media("/a", MediaType::Still, &["x"])));
        assert!(!constraint.matches(&media("/b", MediaType::Still, &[])));
    }

    #[test]
    fn keyword_searches_path_and_metadata() {
        let constraint = Constraint::from_search_text("Abbey").unwrap().compile().unwrap();
        let song = with_metadata(
            media("/m/1.mp4", MediaType::Video, &[]),
            Metadata {
                album: Some("Abbey Road".into()),
                ..Default::default()
            },
        );
        assert!(constraint.matches(&song));
        assert!(constraint.matches(&media("/abbey/2.jpg", MediaType::Still, &[])));
        assert!(!constraint.matches(&media("/m/3.jpg", MediaType::Still, &[])));
    }
}
