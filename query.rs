use crate::catalog::CatalogData;
use crate::constraint::Constraint;
use crate::error::Result;
use crate::shuffle;

/// Hashes of live media satisfying `constraint`, in catalog order.
///
/// The constraint is compiled before any media is looked at, so a bad
/// pattern or expression fails without a partial result. A `folder`
/// constraint selects by directory alone; an unknown reference hash yields
/// an empty result.
pub fn evaluate(snapshot: &CatalogData, constraint: &Constraint) -> Result<Vec<String>> {
    let compiled = constraint.compile()?;

    if let Some(reference) = compiled.folder() {
        let Some(reference) = snapshot.get(reference) else {
            log::debug!("Folder reference {reference} is not cataloged");
            return Ok(Vec::new());
        };
        let directory = reference.directory();
        return Ok(snapshot
            .iter()
            .filter(|media| media.directory() == directory)
            .map(|media| media.hash.clone())
            .collect());
    }

    Ok(snapshot
        .iter()
        .filter(|media| !snapshot.is_tombstoned(&media.hash) && compiled.matches(media))
        .map(|media| media.hash.clone())
        .collect())
}

/// Like [`evaluate`], then shuffled. Returns the seed used so the order can
/// be rebuilt later.
pub fn evaluate_shuffled(
    snapshot: &CatalogData,
    constraint: &Constraint,
    seed: Option<f64>,
) -> Result<(Vec<String>, f64)> {
    Ok(shuffle::shuffled(evaluate(snapshot, constraint)?, seed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::{MediaType, MediaUpdate, Metadata, NewMedia};

    fn add(data: &mut CatalogData, hash: &str, path: &str, tags: &[&str]) {
        assert!(data.add_media(NewMedia {
            hash: hash.into(),
            path: path.into(),
            rotation: 0,
            media_type: MediaType::Still,
            hash_date: 1,
        }));
        for tag in tags {
            data.add_tag(tag, Some(hash));
        }
    }

    fn sample() -> CatalogData {
        let mut data = CatalogData::new();
        add(&mut data, "a", "/lib/cats/a.jpg", &["x", "y"]);
        add(&mut data, "b", "/lib/cats/b.jpg", &["x"]);
        add(&mut data, "c", "/lib/dogs/c.jpg", &["y"]);
        data
    }

    fn run(data: &CatalogData, json: &str) -> Vec<String> {
        evaluate(data, &Constraint::from_json(json).unwrap()).unwrap()
    }

    #[test]
    fn tag_constraints() {
        let data = sample();
        assert_eq!(run(&data, r#"{"all":["x"]}"#), ["a", "b"]);
        assert_eq!(run(&data, r#"{"tagLexer":"x&!y"}"#), ["b"]);
        assert_eq!(run(&data, r#"{"any":["x","y"]}"#), ["a", "b", "c"]);
        assert_eq!(run(&data, r#"{"none":["x"]}"#), ["c"]);
    }

    #[test]
    fn empty_constraint_matches_everything_in_order() {
        assert_eq!(run(&sample(), "{}"), ["a", "b", "c"]);
    }

    #[test]
    fn unknown_tags_match_nothing() {
        let data = sample();
        assert!(run(&data, r#"{"all":["missing"]}"#).is_empty());
        assert!(run(&data, r#"{"any":["missing"]}"#).is_empty());
        assert_eq!(run(&data, r#"{"none":["missing"]}"#), ["a", "b", "c"]);
        assert!(run(&data, r#"{"tagLexer":"missing"}"#).is_empty());
    }

    #[test]
    fn removed_media_never_returned() {
        let mut data = sample();
        assert!(data.remove_media("a", 10));
        assert_eq!(run(&data, r#"{"any":["x","y"]}"#), ["b", "c"]);
        assert_eq!(run(&data, r#"{"folder":"b"}"#), ["b"]);
    }

    #[test]
    fn malformed_expression_fails_before_evaluation() {
        let data = sample();
        let constraint = Constraint::from_json(r#"{"tagLexer":"(x & y"}"#).unwrap();
        assert!(matches!(
            evaluate(&data, &constraint),
            Err(Error::Parse { position: 6, .. })
        ));
    }

    #[test]
    fn folder_groups_by_directory() {
        let data = sample();
        assert_eq!(run(&data, r#"{"folder":"a"}"#), ["a", "b"]);
        // Other fields do not narrow a folder selection.
        assert_eq!(run(&data, r#"{"folder":"c","all":["x"]}"#), ["c"]);
        assert!(run(&data, r#"{"folder":"unknown"}"#).is_empty());
    }

    #[test]
    fn metadata_fields_filter() {
        let mut data = sample();
        data.update_media(
            "c",
            &MediaUpdate {
                metadata: Some(Metadata {
                    width: Some(4000),
                    height: Some(3000),
                    title: Some("Good Boy".into()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        assert_eq!(run(&data, r#"{"width":1920,"height":1080}"#), ["c"]);
        assert_eq!(run(&data, r#"{"title":"good"}"#), ["c"]);
        assert_eq!(run(&data, r#"{"keywordSearch":"CATS"}"#), ["a", "b"]);
        assert!(run(&data, r#"{"type":["gif","video"]}"#).is_empty());
    }

    #[test]
    fn shuffled_result_is_reproducible() {
        let data = sample();
        let constraint = Constraint::default();
        let (first, seed) = evaluate_shuffled(&data, &constraint, None).unwrap();
        let (second, _) = evaluate_shuffled(&data, &constraint, Some(seed)).unwrap();
        assert_eq!(first, second);
        let (fixed, _) = evaluate_shuffled(&data, &constraint, Some(0.5)).unwrap();
        let mut expected = vec!["a".to_string(), "b".into(), "c".into()];
        shuffle::shuffle(&mut expected, 0.5);
        assert_eq!(fixed, expected);
    }
}
