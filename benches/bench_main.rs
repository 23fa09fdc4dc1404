use criterion::BenchmarkId;
use criterion::{criterion_group, criterion_main, Criterion};
use std::io::Cursor;

use bmff::*;

const SAMPLES: u32 = 2000;
const SAMPLE_SIZE: u32 = 512;

/// ftyp, a one-track moov and a single mdat holding every sample.
fn synthetic_file() -> Vec<u8> {
    let ftyp = BoxNode::Ftyp(FtypBox {
        major_brand: "isom".parse().unwrap(),
        ..Default::default()
    });

    let mut stbl = ContainerBox::new(BoxType::StblBox);
    stbl.push(BoxNode::Stsc(StscBox {
        entries: vec![StscEntry {
            first_chunk: 1,
            samples_per_chunk: SAMPLES,
            sample_description_index: 1,
            first_sample: 1,
        }],
        ..Default::default()
    }));
    stbl.push(BoxNode::Stsz(StszBox {
        sample_count: SAMPLES,
        sample_sizes: vec![SAMPLE_SIZE; SAMPLES as usize],
        ..Default::default()
    }));
    stbl.push(BoxNode::Stco(StcoBox {
        entries: vec![0],
        ..Default::default()
    }));
    let mut minf = ContainerBox::new(BoxType::MinfBox);
    minf.push(BoxNode::Container(stbl));
    let mut mdia = ContainerBox::new(BoxType::MdiaBox);
    mdia.push(BoxNode::Container(minf));
    let mut trak = ContainerBox::new(BoxType::TrakBox);
    trak.push(BoxNode::Tkhd(TkhdBox {
        track_id: 1,
        ..Default::default()
    }));
    trak.push(BoxNode::Container(mdia));
    let mut moov = ContainerBox::new(BoxType::MoovBox);
    moov.push(BoxNode::Container(trak));

    let mdat_offset = ftyp.box_size() + moov.box_size() + 8;
    if let Some(BoxNode::Stco(stco)) = moov.find_mut(&[
        BoxType::TrakBox,
        BoxType::MdiaBox,
        BoxType::MinfBox,
        BoxType::StblBox,
        BoxType::StcoBox,
    ]) {
        stco.entries[0] = mdat_offset as u32;
    }
    let mdat = MdatBox::new(vec![0x5au8; (SAMPLES * SAMPLE_SIZE) as usize]);

    let mut bytes = Vec::new();
    for node in &[ftyp, BoxNode::Container(moov), BoxNode::Mdat(mdat)] {
        node.write_box(&mut bytes).unwrap();
    }
    bytes
}

fn round_trip(bytes: &[u8], options: &DecodeOptions) -> u64 {
    let mut source = Cursor::new(bytes);
    let file = File::decode_with(&mut source, options).unwrap();
    let mut out = vec![0u8; file.size() as usize];
    file.encode_to_slice_with_source(&mut out, &mut source)
        .unwrap()
}

fn copy_samples(bytes: &[u8], scratch: &mut [u8]) -> u64 {
    let mut source = Cursor::new(bytes);
    let file = File::decode_with(&mut source, &DecodeOptions::lazy()).unwrap();
    let track = file.track(1).unwrap();
    let mut out = Vec::with_capacity(bytes.len());
    file.copy_sample_data(&mut out, &mut source, &track, 1, SAMPLES, Some(scratch))
        .unwrap()
}

fn criterion_benchmark(c: &mut Criterion) {
    let bytes = synthetic_file();

    for (name, options) in &[
        ("eager", DecodeOptions::default()),
        ("lazy", DecodeOptions::lazy()),
    ] {
        c.bench_with_input(BenchmarkId::new("round_trip", name), &bytes, |b, bytes| {
            b.iter(|| round_trip(bytes, options));
        });
    }

    let mut scratch = vec![0u8; 4096];
    c.bench_with_input(BenchmarkId::new("copy_samples", "4k scratch"), &bytes, |b, bytes| {
        b.iter(|| copy_samples(bytes, &mut scratch));
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
