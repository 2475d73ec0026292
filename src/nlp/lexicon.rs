//! Per-run set of dimension and method dictionaries.

use std::{collections::BTreeMap, path::Path};

use tracing::{debug, info};

use crate::nlp::{
    dictionary::{Dictionary, EntryTag, LexiconError},
    labels::Dimension,
};

const PARADIGM: &str = "\
[supervised]
supervised learning
supervised machine learning
supervised classification
supervised regression
supervised model
supervised models
supervised approach
supervised method
supervised methods
[unsupervised]
unsupervised learning
unsupervised machine learning
unsupervised model
unsupervised approach
unsupervised method
unsupervised methods
self supervised learning
self supervised
[reinforcement]
reinforcement learning
deep reinforcement learning
reinforcement learning agent
multi agent reinforcement learning
[semi_supervised]
semi supervised learning
semi supervised
weakly supervised
weakly supervised learning
self training
";

const LIFECYCLE_PHASE: &str = "\
[planning]
product planning
requirements engineering
requirements elicitation
requirement analysis
requirements analysis
conceptual design
concept design
early design phase
early design stage
idea generation
product portfolio planning
[development_production]
product development
production
manufacturing
assembly
machining
additive manufacturing
injection molding
injection moulding
welding
production planning
[optimization]
process optimization
process optimisation
design optimization
design optimisation
parameter optimization
topology optimization
yield improvement
[use_reuse]
predictive maintenance
condition monitoring
remaining useful life
fault diagnosis
product use phase
usage phase
recycling
remanufacturing
end of life
reuse
after sales service
";

const APPLICATION_CONTEXT: &str = "\
[product_design]
product design
design engineering
computer aided design
cad model
cad models
generative design
design space exploration
[manufacturing_process]
manufacturing process
manufacturing processes
production process
process monitoring
process control
production line
machining process
[quality_assurance]
quality control
quality inspection
quality assurance
quality prediction
defect detection
visual inspection
surface defects
[maintenance_service]
maintenance
prognostics
prognostics and health management
machine health
[supply_chain]
supply chain
supply chain management
demand forecasting
logistics
inventory management
supplier selection
[customer_market]
customer requirements
customer reviews
online reviews
market demand
user feedback
customer satisfaction
";

const METHODS: &str = "\
[random forest]
random forests
[decision tree]
decision trees
[gradient boosting]
gradient boosted trees
gradient boosting machine
xgboost
lightgbm
[support vector machine]
support vector machines
svm
svms
support vector regression
svr
[neural network]
neural networks
artificial neural network
artificial neural networks
ann
anns
multilayer perceptron
mlp
[convolutional neural network]
convolutional neural networks
cnn
cnns
[recurrent neural network]
recurrent neural networks
rnn
[long short-term memory]
lstm
[generative adversarial network]
generative adversarial networks
gan
gans
[autoencoder]
autoencoders
variational autoencoder
[k-means]
k means clustering
[dbscan]
[hierarchical clustering]
agglomerative clustering
[principal component analysis]
pca
[k-nearest neighbors]
k nearest neighbours
k nearest neighbor
knn
[naive bayes]
[bayesian network]
bayesian networks
[gaussian process]
gaussian process regression
gaussian processes
[linear regression]
[logistic regression]
[q-learning]
deep q network
dqn
";

/// Built-in dictionary text for a dimension.
fn builtin_source(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Paradigm => PARADIGM,
        Dimension::LifecyclePhase => LIFECYCLE_PHASE,
        Dimension::ApplicationContext => APPLICATION_CONTEXT,
    }
}

/// Dictionaries for every dimension plus the method dictionary.
#[derive(Debug, Clone)]
pub struct Lexicon {
    dimensions: BTreeMap<Dimension, Dictionary>,
    methods: Dictionary,
}

impl Lexicon {
    /// Dictionaries compiled into the binary.
    pub fn builtin() -> Result<Self, LexiconError> {
        Self::load(None)
    }

    /// Load dictionaries from `dir`, falling back to built-ins per missing file.
    pub fn load(dir: Option<&Path>) -> Result<Self, LexiconError> {
        let mut dimensions = BTreeMap::new();
        for dimension in Dimension::ALL {
            let name = dimension.dictionary_file();
            let source = read_or_builtin(dir, &name, builtin_source(dimension))?;
            let dictionary = Dictionary::parse(&name, EntryTag::Label(dimension), &source)?;
            debug!(%dimension, labels = dictionary.entries().len(), "loaded dimension dictionary");
            dimensions.insert(dimension, dictionary);
        }
        let source = read_or_builtin(dir, "methods.txt", METHODS)?;
        let methods = Dictionary::parse("methods.txt", EntryTag::Method, &source)?;
        info!(
            dimensions = dimensions.len(),
            methods = methods.entries().len(),
            custom = dir.is_some(),
            "lexicon ready"
        );
        Ok(Self {
            dimensions,
            methods,
        })
    }

    /// Assemble a lexicon from already parsed dictionaries.
    pub fn from_parts(dimensions: BTreeMap<Dimension, Dictionary>, methods: Dictionary) -> Self {
        Self {
            dimensions,
            methods,
        }
    }

    pub fn dimension(&self, dimension: Dimension) -> Option<&Dictionary> {
        self.dimensions.get(&dimension)
    }

    pub fn methods(&self) -> &Dictionary {
        &self.methods
    }

    /// Tie-break order of a dimension: section order of its dictionary.
    pub fn precedence(&self, dimension: Dimension) -> Vec<String> {
        self.dimensions
            .get(&dimension)
            .map(Dictionary::canonical_terms)
            .unwrap_or_default()
    }
}

fn read_or_builtin(
    dir: Option<&Path>,
    name: &str,
    builtin: &'static str,
) -> Result<String, LexiconError> {
    let Some(dir) = dir else {
        return Ok(builtin.to_string());
    };
    let path = dir.join(name);
    if !path.exists() {
        debug!(path = %path.display(), "dictionary file missing; using built-in");
        return Ok(builtin.to_string());
    }
    std::fs::read_to_string(&path).map_err(|source| LexiconError::Io { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::normalize::normalize;

    #[test]
    fn builtin_dictionaries_load_without_collisions() {
        let lexicon = Lexicon::builtin().unwrap();
        for dimension in Dimension::ALL {
            assert!(lexicon.dimension(dimension).is_some());
        }
        assert_eq!(
            lexicon.precedence(Dimension::Paradigm),
            vec!["supervised", "unsupervised", "reinforcement", "semi_supervised"]
        );
        assert_eq!(
            lexicon.precedence(Dimension::LifecyclePhase),
            vec!["planning", "development_production", "optimization", "use_reuse"]
        );
    }

    #[test]
    fn semi_supervised_is_not_read_as_supervised() {
        let lexicon = Lexicon::builtin().unwrap();
        let paradigm = lexicon.dimension(Dimension::Paradigm).unwrap();
        let found = paradigm.match_text(&normalize("A semi-supervised learning scheme"));
        assert!(found.contains("semi_supervised"));
        assert!(!found.contains("supervised"));
    }

    #[test]
    fn self_supervised_counts_as_unsupervised() {
        let lexicon = Lexicon::builtin().unwrap();
        let paradigm = lexicon.dimension(Dimension::Paradigm).unwrap();
        let found = paradigm.match_text(&normalize("A self-supervised learning approach"));
        assert!(found.contains("unsupervised"));
        assert!(!found.contains("supervised"));
    }

    #[test]
    fn method_names_are_canonicalised() {
        let lexicon = Lexicon::builtin().unwrap();
        let found = lexicon
            .methods()
            .match_text(&normalize("We compare K-means, SVMs and a CNN."));
        let names: Vec<_> = found.canonical_terms().into_iter().collect();
        assert_eq!(
            names,
            vec!["convolutional neural network", "k-means", "support vector machine"]
        );
    }

    #[test]
    fn directory_files_override_builtins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("paradigm.txt"),
            "[reinforcement]\nreward shaping\n[supervised]\n",
        )
        .unwrap();
        let lexicon = Lexicon::load(Some(dir.path())).unwrap();
        assert_eq!(
            lexicon.precedence(Dimension::Paradigm),
            vec!["reinforcement", "supervised"]
        );
        assert!(lexicon.dimension(Dimension::LifecyclePhase).is_some());
    }

    #[test]
    fn ambiguous_file_fails_the_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("methods.txt"), "[svm]\n[support vector machine]\nSVM\n")
            .unwrap();
        let err = Lexicon::load(Some(dir.path())).unwrap_err();
        assert!(matches!(err, LexiconError::AmbiguousEntry { .. }));
    }
}
