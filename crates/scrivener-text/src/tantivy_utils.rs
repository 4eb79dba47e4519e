use tantivy::schema::{IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

pub const TOKENIZER_NAME: &str = "text_with_stopwords";

const STOP_WORDS: &[&str] = &[
	"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","were","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having","i","me","my","we","our","you","your","about",
];

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field("chunk_id", STRING | STORED);
	schema_builder.add_text_field("user_id", STRING | STORED);
	schema_builder.add_text_field("document_id", STRING | STORED);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER_NAME).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing);
	schema_builder.add_text_field("text", text_options);
	schema_builder.build()
}

pub fn build_analyzer() -> TextAnalyzer {
	TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
		.build()
}

pub fn register_tokenizer(index: &Index) { index.tokenizers().register(TOKENIZER_NAME, build_analyzer()); }

/// Content terms of `text` as the index sees them: lowercased, stop words removed, deduplicated.
pub fn analyze_terms(text: &str) -> Vec<String> {
	let mut analyzer = build_analyzer();
	let mut stream = analyzer.token_stream(text);
	let mut out: Vec<String> = Vec::new();
	while stream.advance() {
		let t = &stream.token().text;
		if !out.iter().any(|x| x == t) { out.push(t.clone()); }
	}
	out
}

/// Fraction of the query's content terms that occur in `content`.
pub fn term_overlap(query: &str, content: &str) -> f32 {
	let q = analyze_terms(query);
	if q.is_empty() { return 0.0; }
	let c = analyze_terms(content);
	let hits = q.iter().filter(|t| c.contains(t)).count();
	hits as f32 / q.len() as f32
}
