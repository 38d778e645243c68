use chapter_core::{simple, xml, Chapter, ChapterTime, RecognitionResult, TitleTemplate, PRESETS};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// A long concert: 120 chapters of four minutes each
fn concert_chapters() -> Vec<Chapter> {
    (0..120u64)
        .map(|i| {
            Chapter::new(
                (6_385_033_233_593_639_483u64 + i).to_string(),
                ChapterTime::from_millis(i * 240_000),
                Some(ChapterTime::from_millis((i + 1) * 240_000 - 1)),
                format!("Chapter {:03}", i + 1),
            )
        })
        .collect()
}

/// Benchmark XML encoding and decoding
fn bench_xml_codec(c: &mut Criterion) {
    let chapters = concert_chapters();
    let document = xml::encode(&chapters).unwrap();

    c.bench_function("xml_encode_120", |b| b.iter(|| xml::encode(black_box(&chapters))));
    c.bench_function("xml_decode_120", |b| b.iter(|| xml::decode(black_box(&document))));
}

/// Benchmark the simple chapter format used by restores
fn bench_simple_codec(c: &mut Criterion) {
    let chapters = concert_chapters();
    let text = simple::encode(&chapters);

    c.bench_function("simple_decode_120", |b| b.iter(|| simple::decode(black_box(&text))));
}

/// Benchmark title rendering for every preset
fn bench_template_render(c: &mut Criterion) {
    let song = RecognitionResult {
        name: "ハジメテノオト".to_string(),
        artists: vec!["初音ミク".to_string(), "malo".to_string()],
        album: "VOCALOID".to_string(),
        id: "22677570".to_string(),
        translated_name: None,
        popularity: Some(95.0),
    };
    let templates: Vec<TitleTemplate> = PRESETS.iter().map(|p| TitleTemplate::new(p.format)).collect();

    c.bench_function("render_all_presets", |b| {
        b.iter(|| {
            for template in &templates {
                black_box(template.render_or_fallback(black_box(&song)));
            }
        })
    });
}

criterion_group!(benches, bench_xml_codec, bench_simple_codec, bench_template_render);
criterion_main!(benches);
