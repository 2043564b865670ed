/// Sled tree 名称常量。
///
/// 修改 tree 名称会导致数据不可访问，请勿随意更改。
/// `fts_*` 三棵树构成全文索引，只允许 store::index 模块写入；
/// `idx_*` 为次级索引，可由主数据重建。

pub const META: &str = "meta";
pub const COUNTERS: &str = "counters";

pub const WORDBOOKS: &str = "wordbooks";
pub const WORDS: &str = "words";
pub const CARDS: &str = "cards";
pub const SRS_STATES: &str = "srs_states";
pub const REVIEWS: &str = "reviews";
pub const IMPORTS: &str = "imports";
pub const SETTINGS: &str = "settings";

// Secondary index trees
pub const WORDS_BY_BOOK: &str = "idx_words_by_book";
pub const CARDS_BY_WORD: &str = "idx_cards_by_word";
pub const SRS_DUE: &str = "idx_srs_due";

// Full-text index trees
pub const FTS_POSTINGS: &str = "fts_postings";
pub const FTS_DOCS: &str = "fts_docs";
pub const FTS_LEMMAS: &str = "fts_lemmas";
