use crate::config::{quoted, unquoted, Config, ConfigNode};
use crate::error::Error;
use crate::math::Interval;

#[test]
fn test_config_round_trip() {
    let mut config = Config::new();
    let root = config.add_node("root");
    root.set("value", 5.31);
    root.set("count", 3i64);
    root.set("text", "αβγ".to_string());

    let serialized = config.write();
    let mut parsed = Config::new();
    parsed.read(&serialized).unwrap();

    let root = parsed.get_node("root").unwrap();
    assert_eq!(root.get::<f64>("value").unwrap(), 5.31);
    assert_eq!(root.get::<i64>("count").unwrap(), 3);
    assert_eq!(root.get::<String>("text").unwrap(), "αβγ");

    assert!(matches!(
        root.get::<f64>("dummy"),
        Err(Error::ConfigNotFound(_))
    ));
    assert!(matches!(
        root.get::<i64>("value"),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn test_config_structural_round_trip() {
    let mut config = Config::new();
    let root = config.add_node("simulation");
    root.set("name", "impact".to_string());
    let child = root.add_child("target");
    child.set("radius", 1.5e4);
    child.set("range", Interval::new(0., f64::INFINITY));
    let nested = child.add_child("material");
    nested.set("density", 2700.);

    let serialized = config.write();
    let mut parsed = Config::new();
    parsed.read(&serialized).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_config_tolerates_whitespace_and_crlf() {
    let source = "\"node\" [\r\n   \r\n  \"key\" = 42   \r\n]\r\n";
    let mut config = Config::new();
    config.read(source).unwrap();
    assert_eq!(config.get_node("node").unwrap().get::<i64>("key").unwrap(), 42);
}

#[test]
fn test_config_entry_without_equals_fails() {
    let source = "\"node\" [\n  \"key\" 42\n]\n";
    let mut config = Config::new();
    let result = config.read(source);
    assert!(matches!(result, Err(Error::ConfigParse { .. })));
}

#[test]
fn test_config_unterminated_node_fails() {
    let source = "\"node\" [\n  \"key\" = 42\n";
    let mut config = Config::new();
    assert!(matches!(config.read(source), Err(Error::ConfigParse { .. })));
}

#[test]
fn test_config_missing_child() {
    let node = ConfigNode::new();
    assert!(matches!(
        node.get_child("nothing"),
        Err(Error::ConfigNotFound(_))
    ));
}

#[test]
fn test_enumerate_children_is_depth_first() {
    let mut config = Config::new();
    let root = config.add_node("root");
    let a = root.add_child("a");
    a.add_child("a1");
    root.add_child("b");

    let mut visited = Vec::new();
    config
        .get_node("root")
        .unwrap()
        .enumerate_children(&mut |name, _| visited.push(name.to_string()));
    assert_eq!(visited, vec!["a", "a1", "b"]);
}

#[test]
fn test_quoted_unquoted() {
    assert_eq!(quoted("abc"), "\"abc\"");
    assert_eq!(unquoted("\"abc\""), "abc");
    assert_eq!(unquoted(&quoted("x y z")), "x y z");
}
