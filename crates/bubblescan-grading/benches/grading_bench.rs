// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmark for grading a full 200-question sheet.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use bubblescan_core::types::{Answer, AnswerVector};
use bubblescan_grading::GradingEngine;

fn bench_grade(c: &mut Criterion) {
    let key: AnswerVector = (0..200).map(|i| Answer::Answered(i % 4)).collect();
    let student: AnswerVector = (0..200)
        .map(|i| if i % 9 == 0 { Answer::Unanswered } else { Answer::Answered((i / 3) % 4) })
        .collect();

    let mut engine = GradingEngine::new();
    engine.set_master_key(key).expect("200 questions fit");

    c.bench_function("grade (200 questions)", |b| {
        b.iter(|| black_box(engine.grade(black_box(&student))));
    });
}

criterion_group!(benches, bench_grade);
criterion_main!(benches);
