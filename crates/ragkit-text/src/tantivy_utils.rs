use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, TextAnalyzer, TokenStream};

/// Tokens shorter than this carry no lexical signal and are never indexed.
pub const MIN_TOKEN_CHARS: usize = 2;

/// Analyzer shared by fitting and querying: split on non-alphanumerics, lower-case.
pub fn build_analyzer() -> TextAnalyzer {
	TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.build()
}

/// Run `text` through a private copy of `analyzer` and collect the terms.
pub fn analyze(analyzer: &TextAnalyzer, text: &str) -> Vec<String> {
	let mut analyzer = analyzer.clone();
	let mut stream = analyzer.token_stream(text);
	let mut terms = Vec::new();
	while stream.advance() {
		let term = &stream.token().text;
		if term.chars().count() >= MIN_TOKEN_CHARS {
			terms.push(term.clone());
		}
	}
	terms
}
