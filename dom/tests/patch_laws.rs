use redlilium_dom::{Dom, Format, Patch, PatchError, apply, decode, diff, encode};

fn dom(json: &str) -> Dom {
    serde_json::from_str(json).unwrap()
}

/// Pairs of (before, after) documents covering the interesting shapes.
fn cases() -> Vec<(Dom, Dom)> {
    let pairs = [
        ("{}", "{}"),
        ("null", "{}"),
        ("{}", r#"{"a":1}"#),
        (r#"{"a":1}"#, "{}"),
        (r#"{"a":{"b":{"c":1}}}"#, r#"{"a":{"b":{"c":2,"d":[1]}}}"#),
        ("[1,2,3]", "[]"),
        ("[]", "[1,[2],{\"x\":3}]"),
        ("[1,{\"a\":1},3]", "[1,{\"a\":2}]"),
        (r#"{"a":[1,2]}"#, r#"{"a":"now a string"}"#),
        (r#"{"a~b":1,"c/d":2}"#, r#"{"a~b":2,"e/f":3}"#),
        (r#"{"":1}"#, r#"{"":[]}"#),
        (
            r#"{"Source":"a.prefab","Entities":{"Entity_[1]":{"Id":1,"Name":"Root","Components":{}}},"Instances":{}}"#,
            r#"{"Source":"a.prefab","Entities":{"Entity_[1]":{"Id":1,"Name":"Renamed","Components":{"Health":{"value":10}}},"Entity_[2]":{"Id":2,"Name":"Child","Components":{}}},"Instances":{}}"#,
        ),
    ];
    pairs.iter().map(|(a, b)| (dom(a), dom(b))).collect()
}

// ---------------------------------------------------------------------------
// diff / apply laws
// ---------------------------------------------------------------------------

#[test]
fn apply_of_diff_reaches_target() {
    for (before, after) in cases() {
        let patch = diff(&before, &after);
        assert_eq!(
            apply(&before, &patch).unwrap(),
            after,
            "diff({before}, {after}) = {patch:?}"
        );
    }
}

#[test]
fn diff_with_self_is_empty() {
    for (before, after) in cases() {
        assert!(diff(&before, &before).is_empty());
        assert!(diff(&after, &after).is_empty());
    }
}

#[test]
fn reverse_diff_restores_original() {
    for (before, after) in cases() {
        let forward = diff(&before, &after);
        let patched = apply(&before, &forward).unwrap();
        let back = diff(&patched, &before);
        assert_eq!(apply(&patched, &back).unwrap(), before);
    }
}

#[test]
fn diff_survives_text_encoding() {
    for (before, after) in cases() {
        let patch = diff(&before, &after);
        let text = encode(&patch, Format::Json, true).unwrap();
        let decoded: Patch = decode(&text, Format::Json).unwrap();
        assert_eq!(apply(&before, &decoded).unwrap(), after);
    }
}

// ---------------------------------------------------------------------------
// Stale patches
// ---------------------------------------------------------------------------

#[test]
fn patch_is_stale_once_target_moves() {
    let before = dom(r#"{"Entities":{"E":{"Name":"a"}}}"#);
    let after = dom(r#"{"Entities":{"E":{"Name":"b"}}}"#);
    let patch = diff(&before, &after);

    let elsewhere = dom(r#"{"Entities":{"F":{"Name":"a"}}}"#);
    assert_eq!(
        apply(&elsewhere, &patch),
        Err(PatchError::PathNotFound("/Entities/E/Name".into()))
    );
}
