use super::Pass;
use forge_ir::Context;
use forge_utils::ForgeResult;
use itertools::Itertools;
use linked_hash_map::LinkedHashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
/// The value returned from parsing an option.
pub enum ParseVal {
    /// A boolean option.
    Bool(bool),
    /// A number option.
    Num(i64),
}

impl ParseVal {
    pub fn bool(&self) -> bool {
        match self {
            ParseVal::Bool(b) => *b,
            ParseVal::Num(n) => *n != 0,
        }
    }

    pub fn num(&self) -> i64 {
        match self {
            ParseVal::Num(n) => *n,
            ParseVal::Bool(b) => i64::from(*b),
        }
    }

    pub fn pos_num(&self) -> Option<u64> {
        u64::try_from(self.num()).ok()
    }
}

impl std::fmt::Display for ParseVal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseVal::Bool(b) => write!(f, "{b}"),
            ParseVal::Num(n) => write!(f, "{n}"),
        }
    }
}

/// Option that can be passed to a pass.
pub struct PassOpt {
    name: &'static str,
    description: &'static str,
    default: ParseVal,
    parse: fn(&str) -> Option<ParseVal>,
}

impl PassOpt {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        default: ParseVal,
        parse: fn(&str) -> Option<ParseVal>,
    ) -> Self {
        Self {
            name,
            description,
            default,
            parse,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn description(&self) -> &'static str {
        self.description
    }

    pub const fn default(&self) -> &ParseVal {
        &self.default
    }

    fn parse(&self, s: &str) -> Option<ParseVal> {
        (self.parse)(s)
    }

    pub fn parse_bool(s: &str) -> Option<ParseVal> {
        match s {
            "true" => Some(ParseVal::Bool(true)),
            "false" => Some(ParseVal::Bool(false)),
            _ => None,
        }
    }

    /// Parse a number from a string.
    pub fn parse_num(s: &str) -> Option<ParseVal> {
        s.parse::<i64>().ok().map(ParseVal::Num)
    }
}

/// Trait that describes named things. Registering a pass with the
/// [PassManager](crate::pass_manager::PassManager) requires this.
///
/// This is separate from [Pass] because these methods don't receive `self`,
/// which would make `Pass` impossible to use as a trait object.
pub trait Named {
    /// The name of a pass. Is used for identifying passes.
    fn name() -> &'static str;
    /// A short description of the pass.
    fn description() -> &'static str;
    /// Set of options that can be passed to the pass.
    fn opts() -> Vec<PassOpt> {
        vec![]
    }
}

/// Construct a pass from a [Context], reading its options and anything else
/// it needs to know before running.
///
/// Passes without such needs get this for free from [Default].
pub trait ConstructPass {
    fn get_opts(ctx: &Context) -> LinkedHashMap<&'static str, ParseVal>
    where
        Self: Named,
    {
        let opts = Self::opts();
        let n = Self::name();
        let mut values: LinkedHashMap<&'static str, ParseVal> = ctx
            .extra_opts
            .iter()
            .filter_map(|opt| {
                // The format is either pass:opt or pass:opt=val
                let (pass, rest) = opt.split_once(':')?;
                if pass != n {
                    return None;
                }
                let mut splits = rest.split('=');
                let opt = splits.next()?;
                let Some(opt) = opts.iter().find(|o| o.name == opt) else {
                    log::warn!("Ignoring unknown option for pass `{n}`: {opt}");
                    return None;
                };
                let val = match splits.next() {
                    Some(v) => {
                        let Some(v) = opt.parse(v) else {
                            log::warn!(
                                "Ignoring invalid value for option `{n}:{}`: {v}",
                                opt.name(),
                            );
                            return None;
                        };
                        v
                    }
                    None => ParseVal::Bool(true),
                };
                Some((opt.name(), val))
            })
            .collect();

        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "Extra options for {}: {}",
                Self::name(),
                values.iter().map(|(o, v)| format!("{o}->{v}")).join(", ")
            );
        }

        // For all options that were not provided with values, fill in the defaults.
        for opt in opts {
            if !values.contains_key(opt.name()) {
                values.insert(opt.name(), opt.default.clone());
            }
        }

        values
    }

    /// Construct the pass using information from the Context
    fn from(ctx: &Context) -> ForgeResult<Self>
    where
        Self: Sized;
}

impl<T: Default + Sized + Pass> ConstructPass for T {
    fn from(_ctx: &Context) -> ForgeResult<Self> {
        Ok(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_ir::{Design, Policy};

    struct Probe;

    impl Named for Probe {
        fn name() -> &'static str {
            "probe"
        }

        fn description() -> &'static str {
            "test pass"
        }

        fn opts() -> Vec<PassOpt> {
            vec![
                PassOpt::new(
                    "verbose",
                    "print more",
                    ParseVal::Bool(false),
                    PassOpt::parse_bool,
                ),
                PassOpt::new("limit", "bound", ParseVal::Num(8), PassOpt::parse_num),
            ]
        }
    }

    impl ConstructPass for Probe {
        fn from(_ctx: &Context) -> ForgeResult<Self> {
            Ok(Probe)
        }
    }

    #[test]
    fn options_fall_back_to_defaults() {
        let mut ctx = Context::new(Design::new(), Policy::default());
        ctx.extra_opts = vec![
            "probe:verbose".to_string(),
            "probe:limit=oops".to_string(),
            "other:limit=3".to_string(),
            "probe:missing=1".to_string(),
        ];
        let opts = Probe::get_opts(&ctx);
        assert!(opts["verbose"].bool());
        assert_eq!(opts["limit"].num(), 8);
        assert_eq!(opts.len(), 2);

        ctx.extra_opts = vec!["probe:limit=3".to_string()];
        let opts = Probe::get_opts(&ctx);
        assert_eq!(opts["limit"].pos_num(), Some(3));
        assert!(!opts["verbose"].bool());
    }
}
