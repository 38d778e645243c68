use chapter_core::{
    backup_path_for, simple, xml, BackupRecord, Chapter, ChapterTime, RecognitionResult, SamplingPolicy,
    SamplingStrategy, TemplateSpec,
};
use tempfile::TempDir;

fn chapters() -> Vec<Chapter> {
    vec![
        Chapter::new("6385033233593639483", ChapterTime::ZERO, Some(ChapterTime::from_millis(205_458)), "Opening"),
        Chapter::new("1206094658586896366", ChapterTime::from_millis(205_458), None, "ハジメテノオト"),
        Chapter::new("77", ChapterTime::from_millis(421_999), Some(ChapterTime::from_millis(421_999)), ""),
    ]
}

#[test]
fn test_xml_and_simple_agree_on_times_and_titles() {
    let from_xml = xml::decode(&xml::encode(&chapters()).unwrap()).unwrap();
    let from_simple = simple::decode(&simple::encode(&chapters())).unwrap();

    assert_eq!(from_xml, chapters());
    assert_eq!(from_xml.len(), from_simple.len());
    for (a, b) in from_xml.iter().zip(&from_simple) {
        assert_eq!(a.start_time(), b.start_time());
        assert_eq!(a.title(), b.title());
    }
}

#[test]
fn test_backup_sidecar_next_to_container() {
    let dir = TempDir::new().unwrap();
    let container = dir.path().join("concert.mkv");
    let sidecar = backup_path_for(&container);
    assert_eq!(sidecar.file_name().unwrap(), "concert.chapters.backup.json");

    BackupRecord::new(chapters()).write_to(&sidecar).unwrap();
    let restored = BackupRecord::read_from(&sidecar).unwrap();
    assert_eq!(restored.chapters(), chapters().as_slice());

    // The sidecar is plain JSON an operator can read
    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&sidecar).unwrap()).unwrap();
    assert_eq!(json[1]["title"], "ハジメテノオト");
    assert_eq!(json[1]["start_time"], "00:03:25.458");
}

#[test]
fn test_window_then_template_for_a_chapter() {
    let chapter = &chapters()[0];
    let policy = SamplingPolicy {
        strategy: SamplingStrategy::End,
        ..SamplingPolicy::default()
    };
    let window = policy.sample_window(chapter.start_seconds(), chapter.end_seconds());
    assert!((window.offset_seconds - (205.458 - 3.0 - 5.0)).abs() < 1e-9);

    let template = TemplateSpec::Preset("with_trans".to_string()).resolve().unwrap();
    let song = RecognitionResult::new("ハジメテノオト", vec!["初音ミク".to_string()]);
    assert_eq!(template.render(&song).unwrap(), "ハジメテノオト - 初音ミク");
}
