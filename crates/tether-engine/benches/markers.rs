use criterion::{Criterion, criterion_group, criterion_main};
use tether_engine::{HostDocument, LanguageId, PointerEngine, TextRange, Vfs};

fn generate_markdown_content(sections: usize) -> String {
    let mut content = String::new();
    for i in 0..sections {
        content.push_str(&format!("# Section {i}\n\nSome paragraph text.\n\n"));
        for j in 0..5 {
            content.push_str(&format!("- Item {i}.{j}\n"));
        }
        content.push('\n');
    }
    content
}

fn bench_marker_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("markers");
    group.sample_size(10);

    let content = generate_markdown_content(100);
    let len = content.len();

    group.bench_function("commit_with_1000_pointers", |b| {
        b.iter_with_setup(
            || {
                let mut vfs = Vfs::new();
                let doc = HostDocument::from_text(LanguageId(1), &content).unwrap();
                let file = vfs.add_document(doc);
                let engine = PointerEngine::new();
                let pointers: Vec<_> = (0..1000)
                    .map(|i| {
                        let start = (i * 7) % (len - 10);
                        engine.create_range_pointer(file, TextRange::new(start, start + 5))
                    })
                    .collect();
                vfs.document_mut(file).unwrap().insert(0, "# Inserted\n\n");
                (vfs, file, engine, pointers)
            },
            |(mut vfs, file, engine, pointers)| {
                vfs.document_mut(file).unwrap().commit(&engine);
                std::hint::black_box(&pointers);
            },
        );
    });

    group.bench_function("coincident_pointers_share_markers", |b| {
        b.iter_with_setup(
            || {
                let mut vfs = Vfs::new();
                let doc = HostDocument::from_text(LanguageId(1), &content).unwrap();
                let file = vfs.add_document(doc);
                let engine = PointerEngine::new();
                let pointers: Vec<_> = (0..1000)
                    .map(|_| engine.create_range_pointer(file, TextRange::new(20, 40)))
                    .collect();
                vfs.document_mut(file).unwrap().insert(0, "x");
                (vfs, file, engine, pointers)
            },
            |(mut vfs, file, engine, pointers)| {
                vfs.document_mut(file).unwrap().commit(&engine);
                std::hint::black_box(&pointers);
            },
        );
    });

    group.bench_function("pending_range_queries_reuse_fold", |b| {
        let mut vfs = Vfs::new();
        let doc = HostDocument::from_text(LanguageId(1), &content).unwrap();
        let file = vfs.add_document(doc);
        let engine = PointerEngine::new();
        let pointers: Vec<_> = (0..200)
            .map(|i| {
                let start = (i * 11) % (len - 10);
                engine.create_range_pointer(file, TextRange::new(start, start + 5))
            })
            .collect();
        vfs.document_mut(file).unwrap().insert(0, "# Inserted\n\n");

        b.iter(|| {
            for pointer in &pointers {
                std::hint::black_box(pointer.range(&vfs));
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_marker_operations);
criterion_main!(benches);
