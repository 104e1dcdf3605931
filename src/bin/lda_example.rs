//! WarpLDA topic modeling example
//!
//! This example demonstrates how to:
//! - Tokenize a small document collection
//! - Build a sparse document-term matrix
//! - Fit a WarpLDA model and inspect the discovered topics
//! - Project a new document into the fitted topic space

use anyhow::Result;
use warplda::utils::evaluation::Evaluator;
use warplda::{CountVectorizer, LdaConfig, Tokenizer, WarpLda};

fn main() -> Result<()> {
    env_logger::init();

    println!("=== WarpLDA Topic Modeling Example ===\n");

    let documents = sample_documents();
    println!("Loaded {} documents\n", documents.len());

    // Step 1: tokenize
    println!("Step 1: Tokenizing documents...");
    let tokenizer = Tokenizer::new().min_length(3);
    let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenizer.tokenize(d)).collect();
    if let Some(first) = tokenized.first() {
        println!("  Sample tokens: {:?}", &first[..first.len().min(8)]);
    }

    // Step 2: vectorize into a sparse count matrix
    println!("\nStep 2: Building document-term matrix...");
    let mut vectorizer = CountVectorizer::new().min_df(1).max_df_ratio(0.9);
    let dtm = vectorizer.fit_transform(&tokenized)?;
    let (n_docs, n_terms) = dtm.shape();
    println!("  Matrix shape: {n_docs} documents x {n_terms} terms");
    println!("  Total tokens: {}", dtm.n_tokens());

    // Step 3: fit the model
    let n_topics = 3;
    println!("\nStep 3: Training WarpLDA with {n_topics} topics...");
    let config = LdaConfig::new(n_topics)
        .doc_topic_prior(0.1)
        .topic_word_prior(0.01)
        .n_iter(400)
        .convergence_tol(1e-3)
        .n_check_convergence(20)
        .seed(42);
    let mut model = WarpLda::new(config)?;
    let doc_topic = model.fit_transform(&dtm)?;

    if let Some(report) = model.fit_report() {
        println!(
            "  Finished after {} iterations (converged: {})",
            report.iterations, report.converged
        );
    }

    // Step 4: discovered topics
    println!("\n=== Discovered Topics ===\n");
    let topics = model.topics(6)?;
    for topic in &topics {
        println!("{topic}");
    }

    // Step 5: topic coherence
    let evaluator = Evaluator::new().with_dtm(dtm.clone());
    println!("\n=== Topic Coherence (UMass) ===\n");
    for topic in &topics {
        let top: Vec<String> = topic.top_words.iter().map(|(w, _)| w.clone()).collect();
        match evaluator.umass_coherence(&top) {
            Some(score) => println!("  Topic {}: {score:.4}", topic.index),
            None => println!("  Topic {}: N/A", topic.index),
        }
    }
    let word_lists: Vec<Vec<String>> = topics
        .iter()
        .map(|t| t.top_words.iter().map(|(w, _)| w.clone()).collect())
        .collect();
    println!("\nTopic diversity: {:.4}", Evaluator::topic_diversity(&word_lists));

    // Step 6: document assignments
    println!("\n=== Document-Topic Assignments ===\n");
    for (i, text) in documents.iter().enumerate() {
        let row = doc_topic.row(i);
        let mut best = 0;
        for k in 1..n_topics {
            if row[k] > row[best] {
                best = k;
            }
        }
        let preview: String = text.chars().take(44).collect();
        println!("  Doc {i:2}: Topic {best} ({:.1}%) - {preview}...", row[best] * 100.0);
    }

    // Step 7: transform an unseen document
    println!("\n=== Transforming a New Document ===\n");
    let new_doc = "Interest rates and inflation drive bond market yields";
    println!("New document: {new_doc}\n");
    let new_tokens = vec![tokenizer.tokenize(new_doc)];
    let new_dtm = vectorizer.transform(&new_tokens)?;
    let projected = model.transform(&new_dtm)?;

    println!("Topic distribution:");
    let mut probs: Vec<(usize, f64)> = projected.row(0).iter().copied().enumerate().collect();
    probs.sort_by(|a, b| b.1.total_cmp(&a.1));
    for (topic, prob) in probs {
        println!("  Topic {topic}: {:.1}%", prob * 100.0);
    }

    // Step 8: training trace
    println!("\n=== Training Convergence ===\n");
    for &(iter, ll) in model.log_likelihood_history() {
        println!("  Iteration {iter:4}: {ll:.2}");
    }

    println!("\n=== Example Complete ===");
    Ok(())
}

/// A small corpus with three clearly separated themes
fn sample_documents() -> Vec<String> {
    let texts = [
        // Markets and rates
        "Central bank raises interest rates as inflation pressures mount across markets",
        "Bond yields climb while equity markets digest the latest inflation report",
        "Investors rotate into value stocks as rate expectations shift higher",
        "Treasury markets price in further tightening after strong inflation data",
        "Equity volatility rises as markets reassess the path of interest rates",
        // Machine learning
        "Neural networks learn hierarchical representations from large training datasets",
        "Gradient descent optimizes model parameters to minimize the training loss",
        "Overfitting shrinks when regularization and dropout constrain model capacity",
        "Transformers process sequences with attention instead of recurrence",
        "Cross validation estimates how well a trained model generalizes",
        // Cooking
        "Simmer the tomato sauce slowly with garlic basil and olive oil",
        "Knead the bread dough until smooth then let it rise overnight",
        "Roast the vegetables with rosemary until caramelized and tender",
        "Whisk the eggs with cream for a rich custard base",
        "Season the broth with ginger and scallions before adding noodles",
    ];
    texts.iter().map(|s| s.to_string()).collect()
}
