use clap::{Parser, ValueEnum};
use csv_core::{ReadFieldResult, ReaderBuilder};
use ism::{Analysis, Cluster, Factor, Factors, FactorSet, Relation, Ssim};
use serde::Serialize;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::str;
use tracing_subscriber::EnvFilter;

/// Derive a leveled hierarchy from pairwise influence judgments.
///
/// The input is tab-separated. A record with one field declares a factor id, a record with two
/// fields declares a factor id and its display name, and a record with three fields judges the
/// relation (V, A, X or O) between two factor ids. Factors are listed in presentation order.
/// Lines starting with `#` are ignored. Quotes have no special meaning, so a field can't contain a
/// tab or a line break.
#[derive(Debug, Parser)]
#[command(name = "ism", version)]
struct Cli {
    /// Judgment file to read; standard input when absent or `-`.
    input: Option<PathBuf>,

    /// How to print the analysis.
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Include every iteration of level partitioning.
    #[arg(long)]
    trace: bool,

    /// Log more; repeat for more detail. RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn invalid<E>(line: u64, error: E) -> io::Error
where
    E: std::fmt::Display,
{
    io::Error::new(io::ErrorKind::InvalidData, format!("line {}: {}", line, error))
}

fn load_judgments<I: io::Read>(mut input: I) -> io::Result<Ssim> {
    let mut inputbuf = [0; 16384];
    let mut fieldbuf = [0; 1024];
    let mut fieldlen = 0;
    let mut record: Vec<String> = Vec::new();
    let mut factors = Factors::new();
    let mut judgments = Vec::new();
    let mut tsv = ReaderBuilder::new()
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .quoting(false)
        .build();

    loop {
        let read = input.read(&mut inputbuf)?;
        let mut bytes = &inputbuf[..read];
        loop {
            let (result, nin, nout) = tsv.read_field(bytes, &mut fieldbuf[fieldlen..]);
            // A record's line count already includes its newline once the terminator has been
            // consumed, but not at a carriage return or at the end of the input.
            let past_newline = bytes[..nin].last() == Some(&b'\n');
            bytes = &bytes[nin..];
            fieldlen += nout;
            match result {
                ReadFieldResult::InputEmpty => break,
                ReadFieldResult::OutputFull => {
                    return Err(invalid(tsv.line(), "field too long"));
                }
                ReadFieldResult::Field { record_end } => {
                    let line = if record_end && past_newline {
                        tsv.line() - 1
                    } else {
                        tsv.line()
                    };
                    let field =
                        str::from_utf8(&fieldbuf[..fieldlen]).map_err(|e| invalid(line, e))?;
                    fieldlen = 0;
                    record.push(field.trim().to_string());

                    if record_end {
                        match record.as_slice() {
                            [id] if id.is_empty() => {}
                            [id] => {
                                factors
                                    .add(Factor::new(id.as_str(), id.as_str()))
                                    .map_err(|e| invalid(line, e))?;
                            }
                            [id, name] => {
                                factors
                                    .add(Factor::new(id.as_str(), name.as_str()))
                                    .map_err(|e| invalid(line, e))?;
                            }
                            [row, column, relation] => {
                                let relation: Relation =
                                    relation.parse().map_err(|e| invalid(line, e))?;
                                judgments.push((line, row.clone(), column.clone(), relation));
                            }
                            _ => {
                                return Err(invalid(
                                    line,
                                    format!("expected 1 to 3 fields, got {}", record.len()),
                                ));
                            }
                        }
                        record.clear();
                    }
                }
                ReadFieldResult::End => {
                    // Judgments may name factors declared further down, so they are applied only
                    // once every factor is known.
                    let mut ssim = Ssim::new(factors);
                    for (line, row, column, relation) in judgments {
                        ssim.judge(&row, &column, relation)
                            .map_err(|e| invalid(line, e))?;
                    }
                    return Ok(ssim);
                }
            }
        }
    }
}

#[derive(Serialize)]
struct FactorReport<'a> {
    id: &'a str,
    name: &'a str,
    initial_driving: usize,
    initial_dependence: usize,
    driving: usize,
    dependence: usize,
    cluster: Cluster,
    level: Option<usize>,
}

#[derive(Serialize)]
struct LevelReport<'a> {
    level: usize,
    factors: Vec<&'a str>,
}

#[derive(Serialize)]
struct SetsReport<'a> {
    factor: &'a str,
    reachability: Vec<&'a str>,
    antecedent: Vec<&'a str>,
    intersection: Vec<&'a str>,
}

#[derive(Serialize)]
struct IterationReport<'a> {
    iteration: usize,
    remaining: Vec<&'a str>,
    sets: Vec<SetsReport<'a>>,
    level_factors: Vec<&'a str>,
}

#[derive(Serialize)]
struct Report<'a> {
    factors: Vec<FactorReport<'a>>,
    initial_matrix: Vec<Vec<u8>>,
    final_matrix: Vec<Vec<u8>>,
    inferred: Vec<[&'a str; 2]>,
    levels: Vec<LevelReport<'a>>,
    edges: Vec<[&'a str; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    iterations: Option<Vec<IterationReport<'a>>>,
}

impl<'a> Report<'a> {
    fn new(analysis: &Analysis<'a>, trace: bool) -> Self {
        let factors = analysis.factors();
        let pair = |(row, column): (usize, usize)| [factors.id(row), factors.id(column)];
        let clusters = analysis.clusters();
        let initial = &analysis.initial().powers;
        let closed = &analysis.closed().powers;

        Report {
            factors: (0..factors.len())
                .map(|f| FactorReport {
                    id: factors.id(f),
                    name: factors.name(f),
                    initial_driving: initial.driving[f],
                    initial_dependence: initial.dependence[f],
                    driving: closed.driving[f],
                    dependence: closed.dependence[f],
                    cluster: clusters[f],
                    level: analysis.partition().level_of(f),
                })
                .collect(),
            initial_matrix: analysis.initial().matrix.rows().collect(),
            final_matrix: analysis.closed().matrix.rows().collect(),
            inferred: analysis.changes().iter().copied().map(pair).collect(),
            levels: analysis
                .partition()
                .levels()
                .iter()
                .map(|level| LevelReport {
                    level: level.level,
                    factors: factors.resolve(&level.factors),
                })
                .collect(),
            edges: analysis.digraph_edges().into_iter().map(pair).collect(),
            iterations: if trace {
                Some(
                    analysis
                        .partition()
                        .iterations()
                        .iter()
                        .map(|step| IterationReport {
                            iteration: step.iteration,
                            remaining: factors.resolve(&step.remaining),
                            sets: step
                                .partition_sets
                                .iter()
                                .map(|(factor, sets)| SetsReport {
                                    factor: factors.id(*factor),
                                    reachability: factors.resolve(&sets.reachability),
                                    antecedent: factors.resolve(&sets.antecedent),
                                    intersection: factors.resolve(&sets.intersection),
                                })
                                .collect(),
                            level_factors: factors.resolve(&step.level_factors),
                        })
                        .collect(),
                )
            } else {
                None
            },
        }
    }
}

fn print_text<W: Write>(mut out: W, analysis: &Analysis<'_>, trace: bool) -> io::Result<()> {
    let factors = analysis.factors();
    let names = |set: &FactorSet| factors.resolve(set).join(", ");
    let initial = &analysis.initial().powers;
    let closed = &analysis.closed().powers;
    let clusters = analysis.clusters();

    writeln!(out, "factors:")?;
    for f in 0..factors.len() {
        writeln!(out, "  {} ({}):", factors.id(f), factors.name(f))?;
        writeln!(
            out,
            "    initial driving power: {}, dependence power: {}",
            initial.driving[f], initial.dependence[f]
        )?;
        writeln!(
            out,
            "    final driving power: {}, dependence power: {}",
            closed.driving[f], closed.dependence[f]
        )?;
        writeln!(out, "    cluster: {}", clusters[f])?;
    }

    writeln!(out)?;
    writeln!(out, "inferred by transitivity: {}", analysis.changes().len())?;
    for &(row, column) in analysis.changes() {
        writeln!(out, "  {} -> {}", factors.id(row), factors.id(column))?;
    }

    if trace {
        for step in analysis.partition().iterations() {
            writeln!(out)?;
            writeln!(out, "iteration {} over {{{}}}:", step.iteration, names(&step.remaining))?;
            for (factor, sets) in step.partition_sets.iter() {
                writeln!(
                    out,
                    "  {}: reachability {{{}}}, antecedent {{{}}}, intersection {{{}}}",
                    factors.id(*factor),
                    names(&sets.reachability),
                    names(&sets.antecedent),
                    names(&sets.intersection)
                )?;
            }
        }
    }

    writeln!(out)?;
    for level in analysis.partition().levels() {
        writeln!(out, "level {}: {}", level.level, names(&level.factors))?;
    }

    writeln!(out)?;
    writeln!(out, "digraph edges:")?;
    for (row, column) in analysis.digraph_edges() {
        writeln!(out, "  {} -> {}", factors.id(row), factors.id(column))?;
    }
    Ok(())
}

fn main() -> io::Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let ssim = match cli.input.as_deref() {
        Some(path) if path.as_os_str() != "-" => load_judgments(File::open(path)?)?,
        _ => load_judgments(io::stdin().lock())?,
    };
    tracing::info!(
        factors = ssim.factors().len(),
        missing = ssim.missing_pairs().count(),
        "loaded judgments"
    );

    let analysis =
        Analysis::new(&ssim).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match cli.format {
        Format::Text => print_text(out, &analysis, cli.trace),
        Format::Json => {
            serde_json::to_writer_pretty(&mut out, &Report::new(&analysis, cli.trace))?;
            writeln!(out)
        }
    }
}
