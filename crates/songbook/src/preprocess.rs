use crate::corpus::Corpus;

/// Embeddable text for every song that has any.
///
/// `names`, `texts` and `sources` are parallel: entry `i` came from
/// `corpus.records()[sources[i]]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedText {
  pub names: Vec<String>,
  pub texts: Vec<String>,
  pub sources: Vec<usize>,
}

impl PreparedText {
  pub fn len(&self) -> usize {
    self.texts.len()
  }

  pub fn is_empty(&self) -> bool {
    self.texts.is_empty()
  }
}

/// Join each song's lyric lines with single spaces, dropping songs whose
/// joined text is blank. Order of surviving songs is preserved.
pub fn prepare(corpus: &Corpus) -> PreparedText {
  let mut prepared = PreparedText::default();

  for (index, record) in corpus.records().iter().enumerate() {
    let text = record.lyrics.join(" ");
    if text.trim().is_empty() {
      continue;
    }

    prepared.names.push(record.filename.clone());
    prepared.texts.push(text);
    prepared.sources.push(index);
  }

  prepared
}
