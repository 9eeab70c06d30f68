//! Per-character word count end to end, across the full job lifecycle.

use std::collections::HashMap;

use mapreduce::{start_job, IntermediatePair, MapReduceClient, Stage, WorkerContext};

struct CharCount;

impl MapReduceClient<(), String, char, u32, char, u32> for CharCount {
    fn map(&self, _key: &(), value: &String, ctx: &WorkerContext<char, u32, char, u32>) {
        for ch in value.chars() {
            ctx.emit2(ch, 1);
        }
    }

    fn reduce(&self, group: &[IntermediatePair<char, u32>], ctx: &WorkerContext<char, u32, char, u32>) {
        let key = group[0].0;
        let total: u32 = group.iter().map(|pair| pair.1).sum();
        ctx.emit3(key, total);
    }
}

#[test]
fn word_count_converges_to_expected_counts() {
    let _ = env_logger::try_init();
    let input = vec![
        ((), "aa".to_string()),
        ((), "bb".to_string()),
        ((), "aa".to_string()),
    ];

    let handle = start_job(CharCount, input, 4).expect("4 workers is a valid job");
    let output = handle.close();

    let mut counts: HashMap<char, u32> = HashMap::new();
    for pair in output {
        *counts.entry(pair.0).or_insert(0) += pair.1;
    }

    assert_eq!(counts.get(&'a'), Some(&4));
    assert_eq!(counts.get(&'b'), Some(&2));
    assert_eq!(counts.len(), 2);
}

#[test]
fn wait_for_job_is_idempotent_and_close_follows() {
    let _ = env_logger::try_init();
    let input = vec![((), "zz".to_string())];
    let handle = start_job(CharCount, input, 2).unwrap();

    handle.wait();
    handle.wait();
    assert_eq!(handle.state().stage, Stage::Reduce);

    let output = handle.close();
    assert_eq!(output, vec![mapreduce::OutputPair('z', 2)]);
}

#[test]
fn zero_workers_is_a_user_error() {
    let err = start_job(CharCount, Vec::<((), String)>::new(), 0).unwrap_err();
    assert_eq!(err, mapreduce::Error::NoWorkers);
}
