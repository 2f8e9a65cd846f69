/// Outcome of a majority vote over sampled answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    /// The winning answer, trimmed.
    pub answer: String,
    pub count: usize,
    pub total: usize,
}

/// Tallies exact post-trim matches; ties go to the answer seen first.
#[must_use]
pub fn tally_votes<S: AsRef<str>>(samples: &[S]) -> Option<Vote> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for sample in samples {
        let answer = sample.as_ref().trim();
        match counts.iter_mut().find(|(seen, _)| *seen == answer) {
            Some((_, count)) => *count += 1,
            None => counts.push((answer, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (answer, count) in counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((answer, count));
        }
    }

    best.map(|(answer, count)| Vote {
        answer: answer.to_string(),
        count,
        total: samples.len(),
    })
}
