use crate::paths::{ExtensionMode, Path};

#[test]
fn test_empty_path() {
    let path = Path::empty();
    assert!(path.is_empty());
    assert!(!path.is_hidden());
    assert!(!path.is_relative());
    assert!(!path.is_absolute());
    assert!(path.parent_path().is_empty());
    assert!(path.file_name().is_empty());
    assert!(path.extension(ExtensionMode::All).is_empty());
}

#[test]
fn test_path_equality() {
    assert_eq!(Path::new("/usr/lib"), Path::new("\\usr\\lib"));
    assert_eq!(Path::new("/usr/lib"), Path::new("/usr////lib"));
    assert_ne!(Path::new("/usr/lib"), Path::new("/ussr/lib"));
}

#[test]
fn test_path_append() {
    assert_eq!(
        Path::new("/usr/local/") / Path::new("share"),
        Path::new("/usr/local/share")
    );
    assert_eq!(
        Path::new("/usr/local") / Path::new("share"),
        Path::new("/usr/local/share")
    );
    assert_eq!(Path::empty() / Path::new("/usr/local"), Path::new("/usr/local"));
    assert_eq!(Path::empty() / Path::new("usr/local"), Path::new("usr/local"));
    assert_eq!(Path::new("/usr/local") / Path::empty(), Path::new("/usr/local"));
    assert_eq!(Path::empty() / Path::empty(), Path::empty());
}

#[test]
fn test_path_is_hidden() {
    assert!(Path::new(".gitignore").is_hidden());
    assert!(Path::new("/home/pavel/.gitignore").is_hidden());
    assert!(!Path::new("file").is_hidden());
    assert!(!Path::new("/home/pavel/file").is_hidden());
}

#[test]
fn test_path_parent_path() {
    assert_eq!(
        Path::new("/home/pavel/file.txt").parent_path(),
        Path::new("/home/pavel/")
    );
    assert_eq!(
        Path::new("/home/pavel/files").parent_path(),
        Path::new("/home/pavel/")
    );
    assert_eq!(
        Path::new("/home/pavel/files/").parent_path(),
        Path::new("/home/pavel/")
    );
    assert_eq!(Path::new("file").parent_path(), Path::empty());
    assert_eq!(Path::new("/").parent_path(), Path::empty());
    assert_eq!(Path::new("/usr").parent_path(), Path::new("/"));
}

#[test]
fn test_path_file_name() {
    assert_eq!(
        Path::new("/home/pavel/file.txt").file_name(),
        Path::new("file.txt")
    );
    assert_eq!(Path::new("/home/pavel/files").file_name(), Path::new("files"));
    assert_eq!(Path::new("/home/pavel/files/").file_name(), Path::new("files"));
    assert_eq!(Path::new("/home").file_name(), Path::new("home"));
    assert_eq!(Path::new("file.txt").file_name(), Path::new("file.txt"));
}

#[test]
fn test_path_extension() {
    assert!(Path::new("/usr/lib").extension(ExtensionMode::All).is_empty());
    assert!(Path::new("/usr/lib/").extension(ExtensionMode::All).is_empty());
    assert_eq!(
        Path::new("file.txt").extension(ExtensionMode::All),
        Path::new("txt")
    );
    assert_eq!(
        Path::new("file.txt").extension(ExtensionMode::Last),
        Path::new("txt")
    );
    assert_eq!(
        Path::new("archive.tar.gz").extension(ExtensionMode::All),
        Path::new("tar.gz")
    );
    assert_eq!(
        Path::new("archive.tar.gz").extension(ExtensionMode::Last),
        Path::new("gz")
    );
    assert!(Path::new(".gitignore").extension(ExtensionMode::All).is_empty());
}

#[test]
fn test_path_replace_extension() {
    assert_eq!(Path::empty().replace_extension("tmp"), Path::empty());
    assert_eq!(Path::new("/").replace_extension("tmp"), Path::new("/"));
    assert_eq!(Path::new("/usr/.").replace_extension("tmp"), Path::new("/usr/."));
    assert_eq!(
        Path::new("/usr/file").replace_extension("tmp"),
        Path::new("/usr/file.tmp")
    );
    assert_eq!(
        Path::new("/usr/file.tar.gz").replace_extension("zip"),
        Path::new("/usr/file.zip")
    );
    assert_eq!(
        Path::new("/usr/file.").replace_extension("tmp"),
        Path::new("/usr/file.tmp")
    );
    assert_eq!(
        Path::new("/usr/.gitignore").replace_extension("tmp"),
        Path::new("/usr/.gitignore.tmp")
    );
    assert_eq!(
        Path::new("/usr/local/..").replace_extension("tmp"),
        Path::new("/usr/local/..")
    );
}

#[test]
fn test_path_remove_extension() {
    assert_eq!(Path::empty().remove_extension(), Path::empty());
    assert_eq!(Path::new("/").remove_extension(), Path::new("/"));
    assert_eq!(
        Path::new("/usr/file.tar.gz").remove_extension(),
        Path::new("/usr/file")
    );
    assert_eq!(Path::new("/usr/file.").remove_extension(), Path::new("/usr/file"));
    assert_eq!(
        Path::new("/usr/.gitignore").remove_extension(),
        Path::new("/usr/.gitignore")
    );
    assert_eq!(
        Path::new("/usr/local/..").remove_extension(),
        Path::new("/usr/local/..")
    );
}

#[test]
fn test_path_remove_special_dirs() {
    assert_eq!(
        Path::new("/usr/lib").remove_special_dirs(),
        Path::new("/usr/lib")
    );
    assert_eq!(
        Path::new("./usr/lib").remove_special_dirs(),
        Path::new("usr/lib")
    );
    assert_eq!(
        Path::new("././usr/lib").remove_special_dirs(),
        Path::new("usr/lib")
    );
    assert_eq!(
        Path::new("/usr/lib/.").remove_special_dirs(),
        Path::new("/usr/lib/")
    );
    assert_eq!(
        Path::new("/usr/./lib").remove_special_dirs(),
        Path::new("/usr/lib")
    );
    assert_eq!(Path::new(".").remove_special_dirs(), Path::empty());
    assert_eq!(Path::new("./.").remove_special_dirs(), Path::empty());
    assert_eq!(Path::new("..").remove_special_dirs(), Path::empty());
    assert_eq!(Path::new("../..").remove_special_dirs(), Path::empty());
    // the trailing-slash behaviour after collapsing is load-bearing
    assert_eq!(
        Path::new("/usr/lib/..").remove_special_dirs(),
        Path::new("/usr/")
    );
    assert_eq!(
        Path::new("/usr/lib/dir/../..").remove_special_dirs(),
        Path::new("/usr/")
    );
    assert_eq!(
        Path::new("/usr/lib/../..").remove_special_dirs(),
        Path::new("/")
    );
    assert_eq!(
        Path::new("/usr/../lib").remove_special_dirs(),
        Path::new("/lib")
    );
    assert_eq!(Path::new("usr/../lib").remove_special_dirs(), Path::new("lib"));
    assert_eq!(
        Path::new("/usr/lib..").remove_special_dirs(),
        Path::new("/usr/lib..")
    );
    assert_eq!(
        Path::new("..usr/lib/..gitignore").remove_special_dirs(),
        Path::new("..usr/lib/..gitignore")
    );
}

#[test]
fn test_path_native_is_idempotent() {
    assert_eq!(Path::new("").native(), "");
    assert_eq!(Path::new("/").native(), "/");
    assert_eq!(Path::new("\\").native(), "/");
    assert_eq!(Path::new("/usr\\\\local////test").native(), "/usr/local/test");
    let once = Path::new("/usr\\local//test");
    assert_eq!(Path::new(once.native()), once);
}

#[test]
fn test_path_unicode_round_trip() {
    let name = "snímek_αβγ_01.ssf";
    let path = Path::new(name);
    assert_eq!(path.native(), name);
    assert_eq!(path.file_name(), Path::new(name));
    assert_eq!(path.extension(ExtensionMode::All), Path::new("ssf"));
}
