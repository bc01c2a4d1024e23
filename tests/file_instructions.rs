//! Range-to-file mapping and read plans over shard metadata.

use ironshard::error::ErrorKind;
use ironshard::file_instruction::{FileInstruction, Take, make_file_instructions, read_instructions};
use ironshard::instruction::ReadInstruction;
use ironshard::shard_info::ShardInfo;

/// Global indexes selected by `instrs` over sources laid out with `lengths`.
fn selected(instrs: &[FileInstruction<usize>], lengths: &[u64]) -> Vec<u64> {
    let starts: Vec<u64> = lengths
        .iter()
        .scan(0, |acc, &l| {
            let s = *acc;
            *acc += l;
            Some(s)
        })
        .collect();
    instrs
        .iter()
        .flat_map(|fi| {
            let start = starts[fi.source] + fi.skip;
            start..start + fi.num_examples(lengths[fi.source])
        })
        .collect()
}

#[test]
fn uneven_shards_with_empty_ones() -> anyhow::Result<()> {
    let refs = ["a", "b", "c", "d", "e"];
    let lengths = [0, 3, 5, 0, 2];
    let instrs = read_instructions(2, 9, &refs, &lengths)?;
    assert_eq!(
        instrs,
        vec![
            FileInstruction { source: "b", skip: 2, take: Take::Count(1) },
            FileInstruction { source: "c", skip: 0, take: Take::Remaining },
            FileInstruction { source: "e", skip: 0, take: Take::Count(1) },
        ]
    );
    assert_eq!(instrs[1].num_examples(5), 5);
    let total: u64 = instrs
        .iter()
        .map(|fi| {
            let i = refs.iter().position(|r| *r == fi.source).unwrap_or_default();
            fi.num_examples(lengths[i])
        })
        .sum();
    assert_eq!(total, 7);
    Ok(())
}

#[test]
fn empty_range_yields_nothing() -> anyhow::Result<()> {
    assert!(read_instructions(3, 3, &[0, 1], &[4, 4])?.is_empty());
    assert!(read_instructions(0, 0, &[0usize; 0], &[])?.is_empty());
    Ok(())
}

#[test]
fn full_range_takes_everything_remaining() -> anyhow::Result<()> {
    let instrs = read_instructions(0, 10, &[0, 1, 2], &[4, 0, 6])?;
    assert_eq!(
        instrs,
        vec![
            FileInstruction { source: 0, skip: 0, take: Take::Remaining },
            FileInstruction { source: 2, skip: 0, take: Take::Remaining },
        ]
    );
    Ok(())
}

#[test]
fn bad_ranges_are_rejected() {
    let err = read_instructions(5, 4, &[0], &[10]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::OutOfRange);
    let err = read_instructions(0, 11, &[0], &[10]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::OutOfRange);
    let err = read_instructions(0, 1, &[0, 1], &[10]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Metadata);
}

#[test]
fn every_range_is_reproduced_exactly() -> anyhow::Result<()> {
    let layouts: [&[u64]; 7] = [
        &[1],
        &[5],
        &[0, 0, 3],
        &[2, 2, 2, 2],
        &[0, 3, 5, 0, 2],
        &[1, 0, 0, 7, 0, 1, 4, 0],
        &[9, 1, 0, 6],
    ];
    for lengths in layouts {
        let n: u64 = lengths.iter().sum();
        let refs: Vec<usize> = (0..lengths.len()).collect();
        for from in 0..=n {
            for to in from..=n {
                let instrs = read_instructions(from, to, &refs, lengths)?;
                assert_eq!(
                    selected(&instrs, lengths),
                    (from..to).collect::<Vec<_>>(),
                    "lengths={lengths:?} [{from}:{to})"
                );
                for fi in &instrs {
                    assert_ne!(lengths[fi.source], 0, "instruction on an empty source");
                    assert_ne!(fi.take, Take::Count(0));
                }
            }
        }
    }
    Ok(())
}

fn sample_info() -> ShardInfo {
    let mut info = ShardInfo::from_split(
        "train",
        [
            ("train-00000-of-00003.tfrecord", 70u64),
            ("train-00001-of-00003.tfrecord", 60),
            ("train-00002-of-00003.tfrecord", 70),
        ],
    );
    info.insert_split(
        "val",
        [("val-00000-of-00002.tfrecord", 25u64), ("val-00001-of-00002.tfrecord", 25)],
    );
    info
}

#[test]
fn plan_concatenates_terms_in_order() -> anyhow::Result<()> {
    let info = sample_info();
    let plan = make_file_instructions(&info, &"train[-5%:]+val[40%:60%]".parse()?)?;
    assert_eq!(plan.examples_per_term, vec![10, 10]);
    assert_eq!(plan.num_examples(), 20);
    assert_eq!(
        plan.instructions,
        vec![
            FileInstruction {
                source: "train-00002-of-00003.tfrecord".to_string(),
                skip: 60,
                take: Take::Remaining
            },
            FileInstruction {
                source: "val-00000-of-00002.tfrecord".to_string(),
                skip: 20,
                take: Take::Remaining
            },
            FileInstruction {
                source: "val-00001-of-00002.tfrecord".to_string(),
                skip: 0,
                take: Take::Count(5)
            },
        ]
    );
    assert_eq!(plan.shard_lengths, vec![70, 25, 25]);
    Ok(())
}

#[test]
fn plan_counts_match_resolution() -> anyhow::Result<()> {
    let info = sample_info();
    for spec in [
        "train",
        "val",
        "train[:1%]",
        "train[33%:67%]",
        "train[69:131]",
        "train[-1:]+val[:-1]",
        "val[10:10]+train[:70]",
        "val+val+train[130:]",
    ] {
        let ri = ReadInstruction::from_spec(spec)?;
        let plan = make_file_instructions(&info, &ri)?;
        let from_files: u64 = plan
            .instructions
            .iter()
            .zip(&plan.shard_lengths)
            .map(|(fi, &len)| fi.num_examples(len))
            .sum();
        let expected: u64 = ri
            .to_absolute(&info.split_lengths())?
            .iter()
            .map(|abs| abs.num_examples(info.split_lengths()[&abs.split]))
            .sum();
        assert_eq!(from_files, expected, "{spec}");
        assert_eq!(plan.num_examples(), expected, "{spec}");
    }
    Ok(())
}

#[test]
fn never_written_split_is_an_empty_shard_error() -> anyhow::Result<()> {
    let info = ShardInfo::from_split(
        "train",
        [("train-00000-of-00002.tfrecord", 0u64), ("train-00001-of-00002.tfrecord", 0)],
    );
    let err = make_file_instructions(&info, &ReadInstruction::new("train")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::EmptyShard);
    Ok(())
}

#[test]
fn ranges_over_empty_sources_are_empty_shard_errors() -> anyhow::Result<()> {
    let err = read_instructions(0, 1, &["a", "b"], &[0, 0]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::EmptyShard);
    let err = read_instructions(0, 3, &[0usize; 0], &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::EmptyShard);
    assert!(read_instructions(0, 0, &["a", "b"], &[0, 0])?.is_empty());
    Ok(())
}

#[test]
fn unknown_split_in_plan() -> anyhow::Result<()> {
    let err = make_file_instructions(&sample_info(), &"test".parse()?).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownSplit);
    Ok(())
}

#[test]
fn display_uses_the_signed_take() {
    let fi = FileInstruction { source: "x", skip: 3, take: Take::Remaining };
    assert_eq!(fi.to_string(), "x skip=3 take=-1");
    assert_eq!(Take::Count(4).as_i64(), 4);
}
