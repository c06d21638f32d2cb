//! FastPileup CLI entry point
//!
//! Queries a SAM or BAM/CRAM file through the tile cache and prints the
//! loaded records or a packed row layout.

use clap::{Args, Parser, Subcommand, ValueEnum};
use fast_pileup::core::{
    CacheConfig, CachingReader, CancellationToken, LoadStatus, Locus, PackingOptions, PeStatsTable,
    QueryResult, ReadFilter, SystemMemoryProbe, TileCache,
};
use fast_pileup::formats::{AlignmentSource, SamSource};
use fast_pileup::layout::{GroupBy, PackedAlignment, Row, RowPacker};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "fast-pileup")]
#[command(about = "Tiled alignment cache and pileup row packer")]
#[command(version)]
#[command(author = "FastPileup Contributors")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum GroupByArg {
    Strand,
    #[value(name = "first-of-pair-strand")]
    FirstOfPairStrand,
    Sample,
    #[value(name = "read-group")]
    ReadGroup,
    Library,
}

impl From<GroupByArg> for GroupBy {
    fn from(arg: GroupByArg) -> Self {
        match arg {
            GroupByArg::Strand => GroupBy::Strand,
            GroupByArg::FirstOfPairStrand => GroupBy::FirstOfPairStrand,
            GroupByArg::Sample => GroupBy::Sample,
            GroupByArg::ReadGroup => GroupBy::ReadGroup,
            GroupByArg::Library => GroupBy::Library,
        }
    }
}

#[derive(Args)]
struct LoadArgs {
    /// Input SAM (plain, .gz, .bz2) or indexed BAM/CRAM
    input: PathBuf,
    /// Locus, e.g. chr1:10,001-12,000
    locus: String,
    /// Maximum read depth kept per bucket
    #[arg(short = 'd', long, default_value = "100")]
    max_depth: usize,
    /// Hide alignments below this mapping quality
    #[arg(short = 'q', long, default_value = "0")]
    min_mapq: u8,
    /// Keep duplicate-flagged reads
    #[arg(long)]
    show_duplicates: bool,
    /// Tile size in bp
    #[arg(long, default_value = "16000")]
    tile_size: u64,
    /// Seed for downsampling
    #[arg(long)]
    seed: Option<u64>,
}

impl LoadArgs {
    fn cache_config(&self) -> CacheConfig {
        let filter = ReadFilter {
            show_duplicates: self.show_duplicates,
            min_mapping_quality: self.min_mapq,
            ..ReadFilter::default()
        };
        let config = CacheConfig::default()
            .tile_size(self.tile_size)
            .max_read_depth(self.max_depth)
            .filter(filter);
        match self.seed {
            Some(seed) => config.seed(seed),
            None => config,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the records loaded for a locus with a coverage summary
    Query {
        #[command(flatten)]
        load: LoadArgs,
    },
    /// Print an ASCII row layout for a locus
    Pack {
        #[command(flatten)]
        load: LoadArgs,
        /// Lay out mates as one unit
        #[arg(long)]
        pair: bool,
        /// Keep categories in separate rows
        #[arg(long = "group-by")]
        group_by: Option<GroupByArg>,
        /// Stop after this many rows
        #[arg(long)]
        max_rows: Option<usize>,
        /// Width of the layout in characters
        #[arg(short = 'w', long, default_value = "100")]
        width: usize,
    },
}

fn is_indexed(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("bam") | Some("cram")
    )
}

fn load<S: AlignmentSource>(source: S, args: &LoadArgs, locus: &Locus) -> anyhow::Result<(QueryResult, PeStatsTable)> {
    let config = args.cache_config();
    config.validate()?;
    let mut pe_stats = PeStatsTable::new(config.min_insert_percentile, config.max_insert_percentile);
    let cache = TileCache::new(source, config).with_memory_probe(Arc::new(SystemMemoryProbe::new()));
    let mut reader = CachingReader::from_cache(cache);
    let token = CancellationToken::new();
    let result = reader.query(
        &locus.chrom,
        locus.start,
        locus.inclusive_end(),
        args.max_depth,
        Some(&mut pe_stats),
        &token,
    )?;
    match result.status {
        LoadStatus::Complete => {}
        LoadStatus::Cancelled => anyhow::bail!("Load of {} was cancelled", locus),
        LoadStatus::LowMemory => anyhow::bail!("Not enough memory to load {}, try a smaller range", locus),
    }
    Ok((result, pe_stats))
}

fn load_from_path(args: &LoadArgs, locus: &Locus) -> anyhow::Result<(QueryResult, PeStatsTable)> {
    if is_indexed(&args.input) {
        #[cfg(feature = "bam")]
        {
            let source = fast_pileup::formats::BamSource::open(&args.input)?;
            return load(source, args, locus);
        }
        #[cfg(not(feature = "bam"))]
        anyhow::bail!("BAM/CRAM input requires the 'bam' feature");
    }
    let source = SamSource::open(&args.input)?;
    load(source, args, locus)
}

fn render_row(row: &Row, locus: &Locus, width: usize) -> String {
    let mut line = vec![b' '; width];
    let span = locus.len().max(1) as f64;
    let column = |pos: u64| -> usize {
        let offset = pos.saturating_sub(locus.start) as f64;
        ((offset / span) * width as f64) as usize
    };
    let mut paint = |start: u64, end: u64, glyph: u8| {
        if end <= locus.start || start >= locus.end {
            return;
        }
        let lo = column(start.max(locus.start)).min(width.saturating_sub(1));
        let hi = column(end.min(locus.end)).clamp(lo + 1, width);
        for c in &mut line[lo..hi] {
            *c = glyph;
        }
    };
    for unit in row.alignments() {
        if let PackedAlignment::Pair(pair) = unit {
            paint(pair.start(), pair.end(), b'-');
        }
        for record in unit.records() {
            let glyph = match record.strand() {
                fast_pileup::core::Strand::Plus => b'>',
                fast_pileup::core::Strand::Minus => b'<',
            };
            paint(record.start, record.end, glyph);
        }
    }
    String::from_utf8_lossy(&line).into_owned()
}

fn print_pe_stats(pe_stats: &PeStatsTable) {
    for (library, stats) in pe_stats.libraries() {
        if let (Some(min), Some(max)) = (stats.min_threshold(), stats.max_threshold()) {
            eprintln!("Insert size [{}]: {}-{} ({} pairs)", library, min, max, stats.sample_count());
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let start = Instant::now();

    match cli.command {
        Commands::Query { load } => {
            let locus: Locus = load.locus.parse()?;
            eprintln!("Loading {} from {:?}", locus, load.input);
            let (result, pe_stats) = load_from_path(&load, &locus)?;

            let mut records = 0usize;
            for record in result.alignments {
                records += 1;
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    record.read_name, record.chrom, record.start + 1, record.end, record.strand(), record.mapping_quality
                );
            }

            let max_coverage = result.counts.iter().map(|c| c.max_coverage()).max().unwrap_or(0);
            let total_coverage: u64 = result.counts.iter().map(|c| c.total_coverage()).sum();
            eprintln!("\n=== Query Statistics ===");
            eprintln!("Records:         {}", records);
            eprintln!("Tiles counted:   {}", result.counts.len());
            eprintln!("Max coverage:    {}", max_coverage);
            eprintln!("Total coverage:  {}", total_coverage);
            print_pe_stats(&pe_stats);
            eprintln!("Time elapsed:    {:.2}s", start.elapsed().as_secs_f64());
        }

        Commands::Pack { load, pair, group_by, max_rows, width } => {
            let locus: Locus = load.locus.parse()?;
            eprintln!("Packing {} from {:?}", locus, load.input);
            let (result, _) = load_from_path(&load, &locus)?;
            let alignments: Vec<Arc<_>> = result.alignments.collect();

            let mut options = PackingOptions::default().paired(pair);
            if let Some(group_by) = group_by {
                options = options.group_by(group_by.into());
            }
            if let Some(max_rows) = max_rows {
                options = options.max_rows(max_rows);
            }
            let rows = RowPacker::new(options).pack(&alignments, locus.end);

            println!("{}", locus);
            for row in &rows {
                println!("|{}|", render_row(row, &locus, width.max(1)));
            }

            let placed: usize = rows.iter().map(|r| r.len()).sum();
            eprintln!("\n=== Packing Statistics ===");
            eprintln!("Alignments:      {}", alignments.len());
            eprintln!("Units placed:    {}", placed);
            eprintln!("Rows:            {}", rows.len());
            eprintln!("Time elapsed:    {:.2}s", start.elapsed().as_secs_f64());
        }
    }

    Ok(())
}
