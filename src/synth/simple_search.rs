use super::TermSource;

/// This source simply replays a fixed list of terms. Handy when the term
/// space is known to be small, or to steer the synthesizer in tests.
pub struct FixedTerms {
    db: Vec<String>,
    last_tried: usize,
}

impl FixedTerms {
    pub fn new<I>(terms: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        FixedTerms {
            db: terms.into_iter().map(Into::into).collect(),
            last_tried: 0,
        }
    }
}

impl TermSource for FixedTerms {
    fn restart(&mut self) {
        self.last_tried = 0;
    }

    fn next_term(&mut self) -> Option<String> {
        match self.db.get(self.last_tried) {
            None => None,
            Some(x) => {
                self.last_tried += 1;
                Some(x.clone())
            },
        }
    }
}
