use crate::Error;

/// Parse command-line identifiers into store ids.
///
/// Every argument must be a positive integer; the first one that is not
/// fails the whole list so that no partial delete or sync happens.
pub fn parse_ids<S: AsRef<str>>(args: &[S]) -> Result<Vec<i64>, Error> {
    args.iter()
        .map(|arg| {
            let arg = arg.as_ref();
            match arg.trim().parse::<i64>() {
                Ok(id) if id > 0 => Ok(id),
                _ => Err(Error::InvalidArgument(format!(
                    "{:?} is not a valid id (expected a positive integer)",
                    arg
                ))),
            }
        })
        .collect()
}
