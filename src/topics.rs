//! Domain gate for incoming questions
//!
//! The service only answers technical questions. Anything that doesn't
//! mention a known technical term is rejected before any embedding or index
//! work happens, keeping junk out of the cache entirely.

/// Substrings that mark a question as in-domain. Multi-word entries match as
/// phrases; everything is compared lowercase.
const KEYWORDS: &[&str] = &[
    "machine learning",
    "deep learning",
    "neural network",
    "gradient descent",
    "backpropagation",
    "overfitting",
    "underfitting",
    "regularization",
    "hyperparameter",
    "learning rate",
    "loss function",
    "activation function",
    "embedding",
    "transformer",
    "attention",
    "fine-tuning",
    "classification",
    "regression",
    "clustering",
    "dataset",
    "training",
    "inference",
    "tokenizer",
    "tensor",
    "pytorch",
    "tensorflow",
    "scikit",
    "numpy",
    "pandas",
    "algorithm",
    "optimization",
    "convolution",
    "recurrent",
    "lstm",
    "bert",
    "gpt",
    "llm",
    "model",
    "feature",
    "vector",
    "precision",
    "recall",
    "accuracy",
    "cross-validation",
    "batch size",
    "epoch",
];

/// Case-insensitive keyword match against the question text.
pub fn is_technical(question: &str) -> bool {
    let question = question.to_lowercase();
    KEYWORDS.iter().any(|keyword| question.contains(keyword))
}
