//! Literal-style constructors for condition and write maps.

/// Build a [`CondMap`](crate::types::CondMap) in place.
///
/// ```
/// use quarry_query::cond;
///
/// let filter = cond! {
///     "age[>]" => 21,
///     "city" => vec!["berlin", "paris"],
/// };
/// assert_eq!(filter.len(), 2);
/// ```
#[macro_export]
macro_rules! cond {
    () => { $crate::types::CondMap::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::types::CondMap::new();
        $(
            map.insert(
                ::std::string::String::from($key),
                $crate::types::CondValue::from($value),
            );
        )+
        map
    }};
}

/// Build a [`DataMap`](crate::types::DataMap) in place.
///
/// ```
/// use quarry_query::data;
///
/// let row = data! {
///     "name" => "ada",
///     "age" => 36,
/// };
/// assert_eq!(row.len(), 2);
/// ```
#[macro_export]
macro_rules! data {
    () => { $crate::types::DataMap::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::types::DataMap::new();
        $(
            map.insert(
                ::std::string::String::from($key),
                $crate::types::SetValue::from($value),
            );
        )+
        map
    }};
}
