#![warn(missing_docs)]
#![doc(test(no_crate_inject))]
#![doc(test(attr(deny(unused, future_incompatible))))]

//! This crate provides an implementation of Interpretive Structural Modeling (ISM), as first
//! described in:
//!
//! - Warfield, Toward Interpretation of Complex Structural Models, IEEE Transactions on Systems,
//!   Man, and Cybernetics, 1974
//!
//! An analyst names a set of factors and judges, for every unordered pair of them, whether one
//! influences the other. Those judgments form the Structural Self-Interaction Matrix ([`Ssim`]).
//! From it this crate derives:
//!
//! - the initial [`ReachabilityMatrix`], encoded directly from the judgments;
//! - its transitive closure, along with the cells that closure had to infer;
//! - the driving and dependence [`Powers`] of every factor, before and after closure;
//! - a partition of the factors into [`Level`]s, together with the trace of every iteration of
//!   the leveling algorithm;
//! - the MICMAC [`Cluster`] of every factor and the edges of the leveled digraph.
//!
//! [`Analysis`] runs the whole pipeline at once:
//!
//! ```
//! use ism::{Analysis, Factor, Factors, Relation, Ssim};
//!
//! # fn main() -> Result<(), ism::Error> {
//! let factors = Factors::from_factors(vec![
//!     Factor::new("A", "Funding"),
//!     Factor::new("B", "Staffing"),
//!     Factor::new("C", "Delivery"),
//! ])?;
//! let mut ssim = Ssim::new(factors);
//! ssim.judge("A", "B", Relation::Drives)?
//!     .judge("A", "C", Relation::Unrelated)?
//!     .judge("B", "C", Relation::Drives)?;
//!
//! let analysis = Analysis::new(&ssim)?;
//! assert_eq!(analysis.level_of("C"), Some(1));
//! assert_eq!(analysis.level_of("B"), Some(2));
//! assert_eq!(analysis.level_of("A"), Some(3));
//! # Ok(())
//! # }
//! ```
//!
//! Everything here is a pure function of the factor list and the judgments. Nothing is cached or
//! updated incrementally; callers are expected to rerun the analysis whenever the input changes.

pub use sorted_iter;

use lasso::{Rodeo, Spur};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use sorted_iter::assume::AssumeSortedByItemExt;
use sorted_iter::sorted_iterator::SortedByItem;
use sorted_iter::SortedIterator;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::iter;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Errors reported while building judgments or running an [`Analysis`].
///
/// Every variant carries the factor ids involved so that callers can point at the offending input.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The same factor id was declared twice.
    #[error("factor {id:?} is declared more than once")]
    DuplicateFactor {
        /// The repeated id.
        id: String,
    },

    /// A judgment refers to a factor id that was never declared.
    #[error("unknown factor {id:?}")]
    UnknownFactor {
        /// The undeclared id.
        id: String,
    },

    /// A judgment pairs a factor with itself. The diagonal is always reflexive and is never
    /// judged.
    #[error("factor {id:?} cannot be judged against itself")]
    SelfRelation {
        /// The factor on both sides of the judgment.
        id: String,
    },

    /// A relation letter other than `V`, `A`, `X` or `O`.
    #[error("invalid relation {value:?}, expected one of V, A, X or O")]
    InvalidRelation {
        /// The text that failed to parse.
        value: String,
    },

    /// Some unordered pair of factors has no judged relation.
    #[error("no relation judged between {row:?} and {column:?}")]
    IncompleteRelation {
        /// The pair member presented first.
        row: String,
        /// The pair member presented second.
        column: String,
    },

    /// The analysis is only meaningful for two or more factors.
    #[error("an analysis needs at least two factors, got {count}")]
    TooFewFactors {
        /// How many factors were declared.
        count: usize,
    },

    /// Level partitioning reached an iteration where no remaining factor qualified.
    #[error("level partitioning stalled with factors {remaining:?} unresolved")]
    StalledPartition {
        /// Ids of the factors that could not be assigned a level.
        remaining: Vec<String>,
        /// The levels that were found before stalling.
        levels: Vec<Level>,
        /// The trace, ending with the round that stalled.
        iterations: Vec<IterationStep>,
    },
}

/// One judgment from the Structural Self-Interaction Matrix, read from the point of view of the
/// row factor.
///
/// The conventional SSIM letters are available through [`Relation::as_char`] and parsing:
///
/// ```
/// use ism::Relation;
///
/// assert_eq!("v".parse(), Ok(Relation::Drives));
/// assert_eq!(Relation::Mutual.to_string(), "X");
/// assert!("Q".parse::<Relation>().is_err());
/// ```
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(try_from = "char", into = "char")]
pub enum Relation {
    /// `V`: the row factor influences the column factor.
    Drives,
    /// `A`: the column factor influences the row factor.
    DrivenBy,
    /// `X`: the two factors influence each other.
    Mutual,
    /// `O`: the two factors are unrelated.
    Unrelated,
}

impl Relation {
    /// The same judgment read from the column factor's point of view.
    ///
    /// ```
    /// use ism::Relation;
    ///
    /// assert_eq!(Relation::Drives.reversed(), Relation::DrivenBy);
    /// assert_eq!(Relation::Mutual.reversed(), Relation::Mutual);
    /// ```
    pub fn reversed(self) -> Self {
        match self {
            Relation::Drives => Relation::DrivenBy,
            Relation::DrivenBy => Relation::Drives,
            other => other,
        }
    }

    /// The SSIM letter for this relation.
    pub fn as_char(self) -> char {
        match self {
            Relation::Drives => 'V',
            Relation::DrivenBy => 'A',
            Relation::Mutual => 'X',
            Relation::Unrelated => 'O',
        }
    }

    /// Whether the row reaches the column, and whether the column reaches the row.
    fn cells(self) -> (bool, bool) {
        match self {
            Relation::Drives => (true, false),
            Relation::DrivenBy => (false, true),
            Relation::Mutual => (true, true),
            Relation::Unrelated => (false, false),
        }
    }
}

impl TryFrom<char> for Relation {
    type Error = Error;

    fn try_from(letter: char) -> Result<Self, Error> {
        match letter.to_ascii_uppercase() {
            'V' => Ok(Relation::Drives),
            'A' => Ok(Relation::DrivenBy),
            'X' => Ok(Relation::Mutual),
            'O' => Ok(Relation::Unrelated),
            _ => Err(Error::InvalidRelation {
                value: letter.to_string(),
            }),
        }
    }
}

impl From<Relation> for char {
    fn from(relation: Relation) -> char {
        relation.as_char()
    }
}

impl FromStr for Relation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(letter), None) => Relation::try_from(letter),
            _ => Err(Error::InvalidRelation {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A factor as entered by the analyst.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Factor {
    /// Unique identity of the factor. All computation is keyed by this.
    pub id: String,
    /// Display name. Never compared.
    pub name: String,
}

impl Factor {
    /// Creates a factor with the given id and display name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Factor {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The ordered, id-unique list of factors under analysis.
///
/// Ids are interned as they are added. A factor's position in presentation order is its row and
/// column index in every [`ReachabilityMatrix`].
pub struct Factors {
    ids: Rodeo<Spur>,
    keys: Vec<Spur>,
    indices: HashMap<Spur, usize>,
    names: Vec<String>,
}

impl Factors {
    /// Creates an empty factor list.
    pub fn new() -> Self {
        Factors {
            ids: Rodeo::new(),
            keys: Vec::new(),
            indices: HashMap::new(),
            names: Vec::new(),
        }
    }

    /// Creates a factor list from factors in presentation order.
    ///
    /// ```
    /// use ism::{Error, Factor, Factors};
    ///
    /// let result = Factors::from_factors(vec![Factor::new("A", "a"), Factor::new("A", "again")]);
    /// assert_eq!(result.err(), Some(Error::DuplicateFactor { id: "A".to_string() }));
    /// ```
    pub fn from_factors<I: IntoIterator<Item = Factor>>(factors: I) -> Result<Self, Error> {
        let mut list = Factors::new();
        for factor in factors {
            list.add(factor)?;
        }
        Ok(list)
    }

    /// Appends a factor and returns its index.
    pub fn add(&mut self, factor: Factor) -> Result<usize, Error> {
        if self.ids.get(factor.id.as_str()).is_some() {
            return Err(Error::DuplicateFactor { id: factor.id });
        }
        let key = self.ids.get_or_intern(factor.id.as_str());
        let index = self.keys.len();
        self.keys.push(key);
        self.indices.insert(key, index);
        self.names.push(factor.name);
        Ok(index)
    }

    /// The number of factors.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if no factor has been added.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Looks up the index of a factor id.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.ids
            .get(id)
            .and_then(|key| self.indices.get(&key).copied())
    }

    fn require(&self, id: &str) -> Result<usize, Error> {
        self.index_of(id).ok_or_else(|| Error::UnknownFactor { id: id.to_string() })
    }

    /// The id of the factor at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn id(&self, index: usize) -> &str {
        self.ids.resolve(&self.keys[index])
    }

    /// The display name of the factor at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    /// Returns an iterator over factor ids in presentation order.
    pub fn ids(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.keys.iter().map(move |key| self.ids.resolve(key))
    }

    /// Maps every index of a set back to its factor id.
    pub fn resolve(&self, set: &FactorSet) -> Vec<&str> {
        set.iter().map(|index| self.id(index)).collect()
    }
}

impl Default for Factors {
    fn default() -> Self {
        Factors::new()
    }
}

impl fmt::Debug for Factors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.ids().zip(self.names.iter()))
            .finish()
    }
}

/// A set of factor indices.
///
/// The indices are kept sorted so that set algebra can be done by merging, and sets of up to
/// eight factors don't touch the heap.
#[derive(Clone, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FactorSet(SmallVec<[usize; 8]>);

impl FactorSet {
    /// Creates a set containing the specified indices.
    ///
    /// It's okay if the provided slice contains duplicates.
    pub fn new(indices: &[usize]) -> Self {
        let mut v = SmallVec::from_slice(indices);
        v.sort_unstable();
        v.dedup();
        FactorSet(v)
    }

    /// The number of factors in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if the set contains `index`.
    pub fn contains(&self, index: usize) -> bool {
        self.0.binary_search(&index).is_ok()
    }

    /// Returns an iterator over the indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + SortedByItem + Clone + '_ {
        self.0.iter().copied().assume_sorted_by_item()
    }

    /// The indices that appear in both sets.
    ///
    /// ```
    /// use ism::FactorSet;
    ///
    /// let a = FactorSet::new(&[0, 2, 3]);
    /// let b = FactorSet::new(&[3, 1, 2]);
    /// assert_eq!(a.intersection(&b), FactorSet::new(&[2, 3]));
    /// ```
    pub fn intersection(&self, other: &Self) -> Self {
        FactorSet(self.iter().intersection(other.iter()).collect())
    }

    /// Returns `true` if `other` contains every index that `self` does.
    pub fn is_subset(&self, other: &Self) -> bool {
        self.len() <= other.len() && self.iter().intersection(other.iter()).eq(self.iter())
    }
}

impl fmt::Debug for FactorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.iter()).finish()
    }
}

impl iter::FromIterator<usize> for FactorSet {
    /// Creates a set containing the specified indices.
    ///
    /// It's okay if the provided iterator contains duplicates.
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut v = SmallVec::from_iter(iter);
        v.sort_unstable();
        v.dedup();
        FactorSet(v)
    }
}

/// The Structural Self-Interaction Matrix: one [`Relation`] for every unordered pair of factors.
///
/// Only the upper triangle is stored, keyed by presentation order, so a pair can never hold
/// contradictory judgments in both directions. Judging a pair in the reverse direction stores the
/// [reversed](Relation::reversed) relation.
///
/// ```
/// use ism::{Factor, Factors, Relation, Ssim};
///
/// # fn main() -> Result<(), ism::Error> {
/// let factors = Factors::from_factors(vec![Factor::new("A", "a"), Factor::new("B", "b")])?;
/// let mut ssim = Ssim::new(factors);
/// assert!(!ssim.is_complete());
///
/// ssim.judge("B", "A", Relation::Drives)?;
/// assert_eq!(ssim.relation("A", "B")?, Some(Relation::DrivenBy));
/// assert_eq!(ssim.relation("B", "A")?, Some(Relation::Drives));
/// assert!(ssim.is_complete());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Ssim {
    factors: Factors,
    judgments: Vec<Option<Relation>>,
}

impl Ssim {
    /// Creates a matrix over the given factors with no judgments yet.
    pub fn new(factors: Factors) -> Self {
        let n = factors.len();
        Ssim {
            factors,
            judgments: vec![None; n * n.saturating_sub(1) / 2],
        }
    }

    /// The factors this matrix judges.
    pub fn factors(&self) -> &Factors {
        &self.factors
    }

    /// Position of the pair `row < column` within the packed upper triangle.
    fn slot(&self, row: usize, column: usize) -> usize {
        debug_assert!(row < column);
        let n = self.factors.len();
        row * (2 * n - row - 1) / 2 + (column - row - 1)
    }

    fn pair(&self, row: &str, column: &str) -> Result<(usize, usize), Error> {
        let r = self.factors.require(row)?;
        let c = self.factors.require(column)?;
        if r == c {
            return Err(Error::SelfRelation { id: row.to_string() });
        }
        Ok((r, c))
    }

    /// Records the relation between two factors, replacing any earlier judgment of the same pair.
    pub fn judge(
        &mut self,
        row: &str,
        column: &str,
        relation: Relation,
    ) -> Result<&mut Self, Error> {
        let (r, c) = self.pair(row, column)?;
        let (slot, relation) = if r < c {
            (self.slot(r, c), relation)
        } else {
            (self.slot(c, r), relation.reversed())
        };
        self.judgments[slot] = Some(relation);
        Ok(self)
    }

    /// The relation between two factors as seen from `row`, if it has been judged.
    pub fn relation(&self, row: &str, column: &str) -> Result<Option<Relation>, Error> {
        let (r, c) = self.pair(row, column)?;
        Ok(if r < c {
            self.judgments[self.slot(r, c)]
        } else {
            self.judgments[self.slot(c, r)].map(Relation::reversed)
        })
    }

    /// Returns an iterator over every `(row, column)` index pair with `row < column`, in
    /// presentation order.
    fn pairs(&self) -> impl Iterator<Item = (usize, usize)> {
        let n = self.factors.len();
        (0..n).flat_map(move |row| (row + 1..n).map(move |column| (row, column)))
    }

    /// Returns an iterator over the index pairs that still lack a judgment, in presentation order.
    pub fn missing_pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        // pairs() visits slots in the same order they are packed in.
        self.pairs()
            .zip(self.judgments.iter())
            .filter(|(_, judgment)| judgment.is_none())
            .map(|(pair, _)| pair)
    }

    /// Returns `true` if every pair of factors has been judged.
    pub fn is_complete(&self) -> bool {
        self.judgments.iter().all(Option::is_some)
    }

    /// Encodes the judgments as the initial reachability matrix, along with the powers computed
    /// over it.
    ///
    /// Fails with [`Error::IncompleteRelation`] for the first pair that has not been judged; no
    /// pair is ever treated as unrelated by default.
    ///
    /// ```
    /// use ism::{Error, Factor, Factors, Relation, Ssim};
    ///
    /// # fn main() -> Result<(), ism::Error> {
    /// let factors = Factors::from_factors(vec![
    ///     Factor::new("A", "a"),
    ///     Factor::new("B", "b"),
    ///     Factor::new("C", "c"),
    /// ])?;
    /// let mut ssim = Ssim::new(factors);
    /// ssim.judge("A", "B", Relation::Mutual)?;
    /// assert_eq!(
    ///     ssim.initial_reachability().err(),
    ///     Some(Error::IncompleteRelation { row: "A".to_string(), column: "C".to_string() })
    /// );
    ///
    /// ssim.judge("A", "C", Relation::Unrelated)?.judge("C", "B", Relation::Drives)?;
    /// let initial = ssim.initial_reachability()?;
    /// assert!(initial.matrix.reaches(0, 1) && initial.matrix.reaches(1, 0));
    /// assert!(initial.matrix.reaches(2, 1) && !initial.matrix.reaches(1, 2));
    /// assert_eq!(initial.powers.driving, vec![2, 2, 2]);
    /// assert_eq!(initial.powers.dependence, vec![2, 3, 1]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn initial_reachability(&self) -> Result<Reachability, Error> {
        let mut matrix = ReachabilityMatrix::identity(self.factors.len());
        for ((row, column), judgment) in self.pairs().zip(self.judgments.iter()) {
            let relation = judgment.ok_or_else(|| Error::IncompleteRelation {
                row: self.factors.id(row).to_string(),
                column: self.factors.id(column).to_string(),
            })?;
            let (forward, backward) = relation.cells();
            if forward {
                matrix.set(row, column);
            }
            if backward {
                matrix.set(column, row);
            }
        }
        Ok(Reachability::new(matrix))
    }
}

/// Cells that transitive closure changed from 0 to 1, as `(row, column)` index pairs.
pub type TransitivityChanges = BTreeSet<(usize, usize)>;

/// A square 0/1 matrix where a 1 at `(i, j)` means factor `i` influences factor `j`.
///
/// Every factor reaches itself: the diagonal is 1 in every matrix this type can represent.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct ReachabilityMatrix {
    size: usize,
    cells: Vec<bool>,
}

impl ReachabilityMatrix {
    /// Creates the matrix where every factor reaches only itself.
    pub fn identity(size: usize) -> Self {
        let mut matrix = ReachabilityMatrix {
            size,
            cells: vec![false; size * size],
        };
        for i in 0..size {
            matrix.set(i, i);
        }
        matrix
    }

    /// Creates a matrix with the given direct influences, plus the diagonal.
    ///
    /// # Panics
    ///
    /// Panics if any index is not less than `size`.
    pub fn from_edges(size: usize, edges: &[(usize, usize)]) -> Self {
        let mut matrix = ReachabilityMatrix::identity(size);
        for &(row, column) in edges {
            assert!(row < size && column < size);
            matrix.set(row, column);
        }
        matrix
    }

    /// The number of rows, which is also the number of columns.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns `true` if factor `row` reaches factor `column`.
    pub fn reaches(&self, row: usize, column: usize) -> bool {
        self.cells[row * self.size + column]
    }

    /// The cell at `(row, column)` as 0 or 1.
    pub fn get(&self, row: usize, column: usize) -> u8 {
        self.reaches(row, column) as u8
    }

    fn set(&mut self, row: usize, column: usize) {
        self.cells[row * self.size + column] = true;
    }

    /// One row of the matrix.
    pub fn row(&self, row: usize) -> &[bool] {
        &self.cells[row * self.size..(row + 1) * self.size]
    }

    /// Returns an iterator over the rows of the matrix as 0/1 values.
    pub fn rows(&self) -> impl Iterator<Item = Vec<u8>> + '_ {
        (0..self.size).map(move |row| self.row(row).iter().map(|&cell| cell as u8).collect())
    }

    /// The number of 1-cells.
    pub fn ones(&self) -> usize {
        self.cells.iter().filter(|&&cell| cell).count()
    }

    /// Returns `true` if every influence chain `i → k → j` is matched by a direct `i → j`.
    pub fn is_transitive(&self) -> bool {
        let n = self.size;
        (0..n).all(|k| {
            (0..n).all(|i| {
                !self.reaches(i, k) || (0..n).all(|j| !self.reaches(k, j) || self.reaches(i, j))
            })
        })
    }

    /// Replaces this matrix with its transitive closure and returns the cells that were added.
    ///
    /// This is Warshall's algorithm. Each cell is updated in place, so an edge inferred through an
    /// early intermediate factor is visible when later intermediates are considered; with a copy of
    /// the matrix per intermediate, chains longer than two hops would be missed.
    ///
    /// ```
    /// use ism::ReachabilityMatrix;
    ///
    /// let mut chain = ReachabilityMatrix::from_edges(4, &[(3, 2), (2, 1), (1, 0)]);
    /// let changes = chain.close();
    /// assert_eq!(changes.len(), 3);
    /// assert!(changes.contains(&(3, 0)));
    /// assert!(chain.is_transitive());
    ///
    /// // Closing is idempotent.
    /// assert!(chain.close().is_empty());
    /// ```
    pub fn close(&mut self) -> TransitivityChanges {
        let n = self.size;
        let mut changes = TransitivityChanges::new();
        for k in 0..n {
            for i in 0..n {
                if !self.reaches(i, k) {
                    continue;
                }
                for j in 0..n {
                    if self.reaches(k, j) && !self.reaches(i, j) {
                        trace!(row = i, column = j, via = k, "inferred reachability");
                        self.set(i, j);
                        changes.insert((i, j));
                    }
                }
            }
        }
        changes
    }

    /// Returns the transitive closure of this matrix and the cells it added, leaving `self`
    /// untouched.
    pub fn closure(&self) -> (Self, TransitivityChanges) {
        let mut closed = self.clone();
        let changes = closed.close();
        (closed, changes)
    }

    /// Computes driving power (row sums) and dependence power (column sums).
    ///
    /// Both include the factor itself, so neither is ever less than 1.
    pub fn powers(&self) -> Powers {
        let n = self.size;
        let mut powers = Powers {
            driving: vec![0; n],
            dependence: vec![0; n],
        };
        for i in 0..n {
            for j in 0..n {
                if self.reaches(i, j) {
                    powers.driving[i] += 1;
                    powers.dependence[j] += 1;
                }
            }
        }
        powers
    }

    /// Reachability, antecedent and intersection sets for every factor still in `remaining`,
    /// restricted to `remaining`.
    fn partition_sets(&self, remaining: &[bool]) -> Vec<(usize, PartitionSet)> {
        let universe = || (0..self.size).filter(move |&j| remaining[j]);
        universe()
            .map(|factor| {
                let reachability: FactorSet =
                    universe().filter(|&j| self.reaches(factor, j)).collect();
                let antecedent: FactorSet =
                    universe().filter(|&j| self.reaches(j, factor)).collect();
                let intersection = reachability.intersection(&antecedent);
                (
                    factor,
                    PartitionSet {
                        reachability,
                        antecedent,
                        intersection,
                    },
                )
            })
            .collect()
    }

    /// Splits the factors into levels by repeatedly removing every factor whose reachability set
    /// equals its intersection set within the factors not yet removed.
    ///
    /// Level 1 holds the factors that influence nothing outside their own mutual group; each later
    /// level is computed as though the earlier ones had been deleted. On a transitively closed
    /// matrix some factor always qualifies, so every factor gets a level. On other matrices an
    /// iteration may find nothing to remove, and then this returns [`Stalled`] instead of looping.
    ///
    /// ```
    /// use ism::{FactorSet, ReachabilityMatrix};
    ///
    /// // 0 and 1 influence each other, and both influence 2.
    /// let (closed, _) = ReachabilityMatrix::from_edges(3, &[(0, 1), (1, 0), (1, 2)]).closure();
    /// let partition = closed.partition().unwrap();
    /// let levels: Vec<_> = partition.levels().iter().map(|l| l.factors.clone()).collect();
    /// assert_eq!(levels, vec![FactorSet::new(&[2]), FactorSet::new(&[0, 1])]);
    ///
    /// // A cycle that was never closed leaves nothing to remove.
    /// let cycle = ReachabilityMatrix::from_edges(3, &[(0, 1), (1, 2), (2, 0)]);
    /// let stalled = cycle.partition().unwrap_err();
    /// assert_eq!(stalled.remaining, FactorSet::new(&[0, 1, 2]));
    /// ```
    pub fn partition(&self) -> Result<Partition, Stalled> {
        let mut remaining = vec![true; self.size];
        let mut unresolved = self.size;
        let mut levels = Vec::new();
        let mut iterations = Vec::new();

        while unresolved > 0 {
            let level = levels.len() + 1;
            let partition_sets = self.partition_sets(&remaining);
            let snapshot: FactorSet = partition_sets.iter().map(|(factor, _)| *factor).collect();
            let level_factors: FactorSet = partition_sets
                .iter()
                .filter(|(_, sets)| sets.qualifies())
                .map(|(factor, _)| *factor)
                .collect();
            trace!(
                iteration = level,
                remaining = unresolved,
                qualified = level_factors.len(),
                "partition iteration"
            );

            // The step goes on the trace before anything is removed, including the step that
            // finds nothing to remove.
            iterations.push(IterationStep {
                iteration: level,
                remaining: snapshot.clone(),
                partition_sets,
                level_factors: level_factors.clone(),
            });

            if level_factors.is_empty() {
                warn!(iteration = level, remaining = unresolved, "level partitioning stalled");
                return Err(Stalled {
                    remaining: snapshot,
                    levels,
                    iterations,
                });
            }

            for factor in level_factors.iter() {
                remaining[factor] = false;
            }
            unresolved -= level_factors.len();
            levels.push(Level {
                level,
                factors: level_factors,
            });
        }

        Ok(Partition { levels, iterations })
    }

    /// The edges of the leveled digraph: every influence `(i, j)` between distinct factors whose
    /// levels differ by exactly one, in row-major order.
    ///
    /// ```
    /// use ism::ReachabilityMatrix;
    ///
    /// let (closed, _) = ReachabilityMatrix::from_edges(3, &[(0, 1), (1, 2)]).closure();
    /// let partition = closed.partition().unwrap();
    /// // 0 → 2 skips a level, so only the two direct links remain.
    /// assert_eq!(closed.digraph_edges(&partition), vec![(0, 1), (1, 2)]);
    /// ```
    pub fn digraph_edges(&self, partition: &Partition) -> Vec<(usize, usize)> {
        let levels: Vec<Option<usize>> = (0..self.size).map(|f| partition.level_of(f)).collect();
        let mut edges = Vec::new();
        for i in 0..self.size {
            for j in 0..self.size {
                if i == j || !self.reaches(i, j) {
                    continue;
                }
                if let (Some(a), Some(b)) = (levels[i], levels[j]) {
                    if a.abs_diff(b) == 1 {
                        edges.push((i, j));
                    }
                }
            }
        }
        edges
    }
}

impl fmt::Debug for ReachabilityMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.rows()).finish()
    }
}

/// Driving and dependence power of every factor, indexed like the matrix they came from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Powers {
    /// How many factors each factor reaches, itself included.
    pub driving: Vec<usize>,
    /// How many factors reach each factor, itself included.
    pub dependence: Vec<usize>,
}

impl Powers {
    /// The largest power of either kind, which sets the scale for [`Powers::cluster`].
    pub fn max_power(&self) -> usize {
        self.driving
            .iter()
            .chain(self.dependence.iter())
            .copied()
            .max()
            .unwrap_or(0)
    }

    /// Places factor `index` in a MICMAC quadrant.
    ///
    /// A power is strong when it is above half of [`Powers::max_power`].
    ///
    /// ```
    /// use ism::{Cluster, ReachabilityMatrix};
    ///
    /// let (closed, _) = ReachabilityMatrix::from_edges(4, &[(0, 1), (1, 2), (2, 1)]).closure();
    /// let powers = closed.powers();
    /// assert_eq!(powers.cluster(0), Cluster::Independent);
    /// assert_eq!(powers.cluster(1), Cluster::Linkage);
    /// assert_eq!(powers.cluster(3), Cluster::Autonomous);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn cluster(&self, index: usize) -> Cluster {
        let max = self.max_power();
        // Compare doubled values so an odd maximum doesn't need rounding.
        let strong = |power: usize| 2 * power > max;
        match (strong(self.driving[index]), strong(self.dependence[index])) {
            (false, false) => Cluster::Autonomous,
            (false, true) => Cluster::Dependent,
            (true, true) => Cluster::Linkage,
            (true, false) => Cluster::Independent,
        }
    }

    /// The MICMAC quadrant of every factor.
    pub fn clusters(&self) -> Vec<Cluster> {
        (0..self.driving.len()).map(|index| self.cluster(index)).collect()
    }
}

/// MICMAC (cross-impact matrix multiplication applied to classification) quadrants.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cluster {
    /// Weak driving and weak dependence: largely disconnected from the system.
    Autonomous,
    /// Weak driving and strong dependence.
    Dependent,
    /// Strong driving and strong dependence: any change ripples back onto the factor itself.
    Linkage,
    /// Strong driving and weak dependence: the key drivers of the system.
    Independent,
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Cluster::Autonomous => "autonomous",
            Cluster::Dependent => "dependent",
            Cluster::Linkage => "linkage",
            Cluster::Independent => "independent",
        })
    }
}

/// A reachability matrix together with the powers computed over it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reachability {
    /// The matrix.
    pub matrix: ReachabilityMatrix,
    /// Row and column sums of `matrix`.
    pub powers: Powers,
}

impl Reachability {
    fn new(matrix: ReachabilityMatrix) -> Self {
        let powers = matrix.powers();
        Reachability { matrix, powers }
    }
}

/// The sets used to decide whether one factor belongs to the current level.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PartitionSet {
    /// Remaining factors this factor reaches, itself included.
    pub reachability: FactorSet,
    /// Remaining factors that reach this factor, itself included.
    pub antecedent: FactorSet,
    /// Factors in both of the other sets.
    pub intersection: FactorSet,
}

impl PartitionSet {
    /// Returns `true` if everything this factor reaches also reaches it back.
    pub fn qualifies(&self) -> bool {
        self.reachability == self.intersection
    }
}

/// One round of level partitioning, recorded before that round removed anything.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IterationStep {
    /// 1-based round number. Successful rounds share their number with the level they produced.
    pub iteration: usize,
    /// Factors that had no level yet when the round started.
    pub remaining: FactorSet,
    /// Partition sets of every factor in `remaining`, in ascending factor order.
    pub partition_sets: Vec<(usize, PartitionSet)>,
    /// Factors that qualified in this round.
    pub level_factors: FactorSet,
}

impl IterationStep {
    /// The partition sets computed for `factor` in this round, if it was still remaining.
    pub fn partition_set(&self, factor: usize) -> Option<&PartitionSet> {
        self.partition_sets
            .binary_search_by_key(&factor, |(f, _)| *f)
            .ok()
            .map(|position| &self.partition_sets[position].1)
    }
}

/// A group of factors removed together.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Level {
    /// 1-based level number; level 1 was removed first.
    pub level: usize,
    /// The factors in this level.
    pub factors: FactorSet,
}

/// The levels found by [`ReachabilityMatrix::partition`] and the trace of how they were found.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Partition {
    levels: Vec<Level>,
    iterations: Vec<IterationStep>,
}

impl Partition {
    /// The levels in removal order.
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Every round of the algorithm, in order.
    pub fn iterations(&self) -> &[IterationStep] {
        &self.iterations
    }

    /// The level number of factor `index`.
    pub fn level_of(&self, index: usize) -> Option<usize> {
        self.levels
            .iter()
            .find(|level| level.factors.contains(index))
            .map(|level| level.level)
    }
}

/// Returned by [`ReachabilityMatrix::partition`] when a round finds no qualifying factor.
///
/// Carries everything computed up to that point, including the final, fruitless round.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("level partitioning stalled with {} factors unresolved", .remaining.len())]
pub struct Stalled {
    /// Factors that never received a level.
    pub remaining: FactorSet,
    /// The levels that were found before stalling.
    pub levels: Vec<Level>,
    /// The trace, ending with the round that stalled.
    pub iterations: Vec<IterationStep>,
}

impl Stalled {
    /// Names the unresolved factors by id, keeping the levels and trace as they are.
    ///
    /// ```
    /// use ism::{Error, Factor, Factors, ReachabilityMatrix};
    ///
    /// # fn main() -> Result<(), ism::Error> {
    /// let factors = Factors::from_factors(vec![
    ///     Factor::new("A", "a"),
    ///     Factor::new("B", "b"),
    ///     Factor::new("C", "c"),
    /// ])?;
    /// let cycle = ReachabilityMatrix::from_edges(3, &[(0, 1), (1, 2), (2, 0)]);
    /// match cycle.partition().unwrap_err().into_error(&factors) {
    ///     Error::StalledPartition { remaining, levels, iterations } => {
    ///         assert_eq!(remaining, vec!["A", "B", "C"]);
    ///         assert!(levels.is_empty());
    ///         assert_eq!(iterations.len(), 1);
    ///     }
    ///     other => panic!("unexpected error {}", other),
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn into_error(self, factors: &Factors) -> Error {
        Error::StalledPartition {
            remaining: factors
                .resolve(&self.remaining)
                .into_iter()
                .map(str::to_string)
                .collect(),
            levels: self.levels,
            iterations: self.iterations,
        }
    }
}

/// Every output of Interpretive Structural Modeling for one set of judgments.
///
/// ```
/// use ism::{Analysis, Error, Factor, Factors, Ssim};
///
/// # fn main() -> Result<(), ism::Error> {
/// let ssim = Ssim::new(Factors::from_factors(vec![Factor::new("A", "alone")])?);
/// assert_eq!(Analysis::new(&ssim).err(), Some(Error::TooFewFactors { count: 1 }));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Analysis<'a> {
    factors: &'a Factors,
    initial: Reachability,
    closed: Reachability,
    changes: TransitivityChanges,
    partition: Partition,
}

impl<'a> Analysis<'a> {
    /// Encodes, closes, measures and partitions the judgments in `ssim`.
    pub fn new(ssim: &'a Ssim) -> Result<Self, Error> {
        let factors = ssim.factors();
        if factors.len() < 2 {
            return Err(Error::TooFewFactors {
                count: factors.len(),
            });
        }

        debug!(factors = factors.len(), "encoding relations");
        let initial = ssim.initial_reachability()?;

        let (closed, changes) = initial.matrix.closure();
        debug!(inferred = changes.len(), "closed reachability matrix");
        let closed = Reachability::new(closed);

        let partition = closed
            .matrix
            .partition()
            .map_err(|stalled| stalled.into_error(factors))?;
        debug!(levels = partition.levels().len(), "partitioned factors");

        Ok(Analysis {
            factors,
            initial,
            closed,
            changes,
            partition,
        })
    }

    /// The factors that were analyzed.
    pub fn factors(&self) -> &'a Factors {
        self.factors
    }

    /// The matrix encoded directly from the judgments, and its powers.
    pub fn initial(&self) -> &Reachability {
        &self.initial
    }

    /// The transitively closed matrix, and its powers.
    pub fn closed(&self) -> &Reachability {
        &self.closed
    }

    /// Cells of the closed matrix that were inferred rather than judged.
    pub fn changes(&self) -> &TransitivityChanges {
        &self.changes
    }

    /// The levels and the iteration trace.
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// The level of the factor with the given id.
    pub fn level_of(&self, id: &str) -> Option<usize> {
        self.partition.level_of(self.factors.index_of(id)?)
    }

    /// MICMAC quadrant of every factor, from the closed powers.
    pub fn clusters(&self) -> Vec<Cluster> {
        self.closed.powers.clusters()
    }

    /// Edges of the leveled digraph over the closed matrix.
    pub fn digraph_edges(&self) -> Vec<(usize, usize)> {
        self.closed.matrix.digraph_edges(&self.partition)
    }
}
