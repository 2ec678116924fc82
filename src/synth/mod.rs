pub mod simple_search;
pub mod term_enum;

/// A term source is an iterator-like structure handing out candidate terms
/// for the term solver. Unlike a plain iterator it can be rewound, because
/// every synthesis iteration starts again from the simplest terms.
pub trait TermSource {
    /// Go back to the first term of the sequence.
    fn restart(&mut self);

    /// Query the source for the next term to try. The source may return
    /// `None` if it can no longer provide any new term.
    fn next_term(&mut self) -> Option<String>;
}
