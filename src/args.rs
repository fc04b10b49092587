use clap::Parser;

/// Booth-level analytics of assembly elections.
#[derive(Parser, Debug, Clone, Default)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) The JSON run configuration. All the other options override the
    /// values it contains. See the manual of booth_analytics for the format.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path) The booth data. Overrides the data sources of the configuration.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (json or xlsx, default guessed from the file extension) The type of the input.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// (assembly id, may be repeated) Only report on these assemblies. All the visible
    /// assemblies are reported by default.
    #[clap(short, long, value_parser)]
    pub assembly: Vec<String>,

    /// (default 2021) The election used for the assembly figures.
    #[clap(short, long, value_parser)]
    pub year: Option<u32>,

    /// (file path) A JSON document store. When provided, the stations are read from it, and
    /// the widget and page settings too.
    #[clap(short, long, value_parser)]
    pub store: Option<String>,

    /// If passed as an argument, the stations read from the input are written to the store.
    #[clap(long, takes_value = false)]
    pub import: bool,

    /// (file path or user id) A JSON user profile, or the id of a user of the store. The
    /// report only contains what this user may see. Without it, everything is reported.
    #[clap(short, long, value_parser)]
    pub user: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the report will be written in JSON format to the given
    /// location. Setting this option overrides the path that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference report in JSON format. If provided, boothdash will
    /// check that the report matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
