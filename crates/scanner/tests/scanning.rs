use rayon::prelude::*;
use scanner::adapters::{Declaration, MetadataAdapter, Modifiers};
use scanner::errors::ResolveError;
use scanner::vfs::{Container, DirectoryContainer, Entry, ZipContainer};
use scanner::{BytecodeAdapter, ScanStats, Scanner, UnitMetadata};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;
use testing::classfile::{ACC_PRIVATE, ACC_PUBLIC, ACC_STATIC};
use testing::jar::{extract_jar, write_jar};
use testing::{Annotation, ClassFileBuilder, FieldBuilder, MethodBuilder};

/// Resolves every accepted entry to its own path and remembers each call.
#[derive(Default)]
struct RecordingAdapter {
    resolved: Mutex<Vec<String>>,
}

impl RecordingAdapter {
    fn resolved(&self) -> Vec<String> {
        self.resolved.lock().expect("resolved lock").clone()
    }
}

impl MetadataAdapter for RecordingAdapter {
    type Unit = String;
    type Field = String;
    type Member = String;

    fn accepts_input(&self, path: &str) -> bool {
        path.ends_with(".class")
    }

    fn resolve(&self, entry: &dyn Entry) -> Result<String, ResolveError> {
        let path = entry.relative_path().to_string();
        self.resolved.lock().expect("resolved lock").push(path.clone());
        Ok(path)
    }

    fn class_name(&self, unit: &String) -> String {
        unit.clone()
    }

    fn superclass_name(&self, _unit: &String) -> String {
        String::new()
    }

    fn interface_names(&self, _unit: &String) -> Vec<String> {
        Vec::new()
    }

    fn class_annotation_names(&self, _unit: &String) -> Vec<String> {
        Vec::new()
    }

    fn fields<'u>(&self, _unit: &'u String) -> Vec<&'u String> {
        Vec::new()
    }

    fn field_name(&self, field: &String) -> String {
        field.clone()
    }

    fn field_type_name(&self, _field: &String) -> String {
        String::new()
    }

    fn field_annotation_names(&self, _field: &String) -> Vec<String> {
        Vec::new()
    }

    fn members<'u>(&self, _unit: &'u String) -> Vec<&'u String> {
        Vec::new()
    }

    fn member_name(&self, member: &String) -> Option<String> {
        Some(member.clone())
    }

    fn parameter_names(&self, _member: &String) -> Vec<String> {
        Vec::new()
    }

    fn return_type_name(&self, _member: &String) -> String {
        "void".to_string()
    }

    fn member_modifier(&self, _member: &String) -> String {
        String::new()
    }

    fn member_annotation_names(&self, _member: &String) -> Vec<String> {
        Vec::new()
    }

    fn parameter_annotation_names(&self, _member: &String, _index: usize) -> Vec<String> {
        Vec::new()
    }

    fn modifiers(&self, _declaration: Declaration<'_, String, String, String>) -> Option<Modifiers> {
        None
    }
}

fn sample_classes() -> Vec<(String, Vec<u8>)> {
    let b = ClassFileBuilder::new("a.B")
        .interface("java.lang.Runnable")
        .annotation(Annotation::visible("a.Component"))
        .field(FieldBuilder::new("names", "[Ljava/lang/String;").access(ACC_PRIVATE))
        .method(MethodBuilder::constructor("(ILjava/lang/String;)V").access(ACC_PUBLIC))
        .method(MethodBuilder::new("run", "()V").access(ACC_PUBLIC))
        .method(MethodBuilder::static_initializer());
    let anonymous = ClassFileBuilder::new("a.C$1")
        .access(0)
        .interface("java.lang.Runnable")
        .method(MethodBuilder::constructor("()V"))
        .method(MethodBuilder::new("run", "()V").access(ACC_PUBLIC));
    let util = ClassFileBuilder::new("a.util.Strings")
        .method(
            MethodBuilder::new("join", "([[Ljava/lang/String;C)Ljava/lang/String;")
                .access(ACC_PUBLIC | ACC_STATIC),
        );

    [b, anonymous, util]
        .iter()
        .map(|class| (class.entry_path(), class.build()))
        .collect()
}

fn write_sample_jar(path: &Path, extra: &[(&str, &[u8])]) {
    let classes = sample_classes();
    let mut entries: Vec<(&str, &[u8])> = vec![("a/", b"".as_slice())];
    entries.extend(
        classes
            .iter()
            .map(|(path, bytes)| (path.as_str(), bytes.as_slice())),
    );
    entries.extend_from_slice(extra);
    write_jar(path, &entries).expect("write jar");
}

fn by_name(units: Vec<UnitMetadata>) -> Vec<UnitMetadata> {
    let mut units = units;
    units.sort_by(|a, b| a.name.cmp(&b.name));
    units
}

#[test]
fn only_accepted_entries_are_resolved() {
    let dir = TempDir::new().expect("temp dir");
    let jar = dir.path().join("scenario.jar");
    write_jar(
        &jar,
        &[
            ("a/B.class", b"B".as_slice()),
            ("a/", b"".as_slice()),
            ("a/C$1.class", b"C1".as_slice()),
            ("a/readme.txt", b"readme".as_slice()),
        ],
    )
    .expect("write jar");

    let container = ZipContainer::open(&jar).expect("open jar");
    let adapter = RecordingAdapter::default();
    let stats = ScanStats::new();
    let report = Scanner::new(&adapter, &stats).scan(&container, |_, _| {});
    container.close();

    assert_eq!(adapter.resolved(), vec!["a/B.class", "a/C$1.class"]);
    assert_eq!(report.entries, 3);
    assert_eq!(report.accepted, 2);
    assert_eq!(report.resolved, 2);
    assert!(report.skipped.is_empty());
}

#[test]
fn broken_entry_does_not_stop_the_scan() {
    let dir = TempDir::new().expect("temp dir");
    let jar = dir.path().join("broken.jar");
    write_sample_jar(
        &jar,
        &[
            ("a/Corrupt.class", b"\xCA\xFE\xBA\xBE\x00".as_slice()),
            ("z/Last.class", ClassFileBuilder::new("z.Last").build().as_slice()),
        ],
    );

    let container = ZipContainer::open(&jar).expect("open jar");
    let adapter = BytecodeAdapter::default();
    let stats = ScanStats::new();
    let (units, report) = Scanner::new(&adapter, &stats).collect(&container);

    let names: Vec<_> = units.iter().map(|unit| unit.name.as_str()).collect();
    assert_eq!(names, vec!["a.B", "a.C$1", "a.util.Strings", "z.Last"]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].path, "a/Corrupt.class");
    assert!(report.skipped[0].reason.contains("a.Corrupt"));
    assert!(report.is_complete());
}

#[test]
fn extracted_metadata_matches_declarations() {
    let dir = TempDir::new().expect("temp dir");
    let jar = dir.path().join("lib.jar");
    write_sample_jar(&jar, &[]);

    let container = ZipContainer::open(&jar).expect("open jar");
    let adapter = BytecodeAdapter::default();
    let (units, _) = Scanner::new(&adapter, &ScanStats::new()).collect(&container);

    let b = &units[0];
    assert_eq!(b.name, "a.B");
    assert_eq!(b.superclass, "java.lang.Object");
    assert_eq!(b.interfaces, vec!["java.lang.Runnable"]);
    assert_eq!(b.tags, vec!["a.Component"]);
    assert_eq!(b.fields[0].type_name, "java.lang.String[]");
    assert_eq!(
        b.full_member_keys().collect::<Vec<_>>(),
        vec!["a.B.<init>(int, java.lang.String)", "a.B.run()"]
    );

    let anonymous = &units[1];
    assert!(!anonymous.is_public);
    assert_eq!(
        anonymous.member("<init>()").map(|m| m.modifiers.as_str()),
        Some("")
    );

    let join = units[2]
        .member("join(java.lang.String[][], char)")
        .expect("join member");
    assert_eq!(join.modifiers, "public static");
    assert_eq!(join.return_type, "java.lang.String");
}

#[test]
fn directory_and_archive_scans_agree() {
    let dir = TempDir::new().expect("temp dir");
    let jar = dir.path().join("lib.jar");
    write_sample_jar(&jar, &[("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n".as_slice())]);
    let classes = dir.path().join("classes");
    extract_jar(&jar, &classes).expect("extract jar");

    let adapter = BytecodeAdapter::default();
    let stats = ScanStats::new();
    let scanner = Scanner::new(&adapter, &stats);

    let archive = ZipContainer::open(&jar).expect("open jar");
    let (from_archive, archive_report) = scanner.collect(&archive);
    let directory = DirectoryContainer::open(&classes).expect("open directory");
    let (from_directory, directory_report) = scanner.collect(&directory);

    assert_eq!(by_name(from_archive), by_name(from_directory));
    assert_eq!(archive_report.accepted, directory_report.accepted);
    assert_eq!(archive_report.entries, 4);
    assert_eq!(directory_report.entries, 4);
    assert_eq!(stats.total_number_of_scans(), 2);
}

#[test]
fn concurrent_scans_share_the_counters() {
    let dir = TempDir::new().expect("temp dir");
    let jars: Vec<_> = (0..8)
        .map(|i| {
            let jar = dir.path().join(format!("lib-{i}.jar"));
            write_sample_jar(&jar, &[]);
            jar
        })
        .collect();

    let adapter = BytecodeAdapter::default();
    let stats = ScanStats::new();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .build()
        .expect("thread pool");

    let reports: Vec<_> = pool.install(|| {
        jars.par_iter()
            .map(|jar| {
                let container = ZipContainer::open(jar).expect("open jar");
                let (units, report) = Scanner::new(&adapter, &stats).collect(&container);
                container.close();
                assert_eq!(units.len(), 3);
                report
            })
            .collect()
    });

    let expected_ms: u64 = reports
        .iter()
        .map(|report| report.elapsed.as_millis() as u64)
        .sum();
    assert_eq!(stats.total_number_of_scans(), 8);
    assert_eq!(stats.total_number_of_queries(), 24);
    assert_eq!(stats.total_scan_time_ms(), expected_ms);
}

#[test]
fn closing_mid_scan_ends_enumeration() {
    let dir = TempDir::new().expect("temp dir");
    let jar = dir.path().join("lib.jar");
    write_sample_jar(&jar, &[]);

    let container = ZipContainer::open(&jar).expect("open jar");
    let adapter = BytecodeAdapter::default();
    let stats = ScanStats::new();

    let mut seen = Vec::new();
    let report = Scanner::new(&adapter, &stats).scan(&container, |entry, _| {
        seen.push(entry.relative_path().to_string());
        container.close();
    });

    assert_eq!(seen, vec!["a/B.class"]);
    assert_eq!(report.resolved, 1);
    assert!(!report.is_complete());
    assert!(container.is_closed());
    container.close();
}

#[test]
fn scan_config_from_file_drives_the_adapter() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = dir.path().join("scanner.toml");
    fs::write(&config_path, "max_entry_bytes = 8\n").expect("write config");
    let jar = dir.path().join("lib.jar");
    write_sample_jar(&jar, &[]);

    let config = scanner::ScanConfig::from_file(&config_path).expect("load config");
    let adapter = BytecodeAdapter::from_config(&config);
    let container = ZipContainer::open(&jar).expect("open jar");
    let (units, report) = Scanner::new(&adapter, &ScanStats::new()).collect(&container);

    assert!(units.is_empty());
    assert_eq!(report.skipped.len(), 3);
    assert!(report.skipped.iter().all(|skipped| skipped.reason.contains("8 byte limit")));
}
