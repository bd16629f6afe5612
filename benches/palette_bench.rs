use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mcsquash::palette::{normalize_id, PaletteTable};
use mcsquash::squashed::{decode, encode};
use std::io::Cursor;

/// 64×64×64 box of terrain-like ids: mostly stone and air, some ores.
fn terrain_stream() -> Vec<String> {
    (0..64 * 64 * 64)
        .map(|i: usize| {
            let id = match (i / 4096, i % 97) {
                (y, _) if y > 40 => "minecraft:air",
                (_, 0)           => "minecraft:iron_ore",
                (_, 1)           => "minecraft:coal_ore",
                (_, 2..=5)       => "minecraft:dirt",
                _                => "minecraft:stone",
            };
            normalize_id(Some(id))
        })
        .collect()
}

fn bench_palette(c: &mut Criterion) {
    let stream = terrain_stream();
    c.bench_function("palette_encode_262k", |b| b.iter(|| PaletteTable::encode(black_box(&stream))));

    let table = PaletteTable::encode(&stream);
    c.bench_function("palette_decode_262k", |b| b.iter(|| black_box(&table).decode().unwrap()));
}

fn bench_archive(c: &mut Criterion) {
    let payload = vec![0x78u8; 6 * 1024];
    let slots: Vec<(usize, Option<&[u8]>)> = (0..1024).map(|s| (s, Some(payload.as_slice()))).collect();

    c.bench_function("archive_encode_full_region", |b| {
        b.iter(|| encode(black_box(slots.iter().copied())).unwrap())
    });

    let archive = encode(slots.iter().copied()).unwrap();
    c.bench_function("archive_decode_slot", |b| b.iter(|| decode(black_box(&archive), 517).unwrap()));

    c.bench_function("archive_reader_all_slots", |b| {
        b.iter(|| {
            let mut reader = mcsquash::SquashedReader::new(Cursor::new(&archive)).unwrap();
            for slot in 0..1024 {
                black_box(reader.read_slot(slot).unwrap());
            }
        })
    });
}

criterion_group!(benches, bench_palette, bench_archive);
criterion_main!(benches);
