/// Declares a [Flow](crate::util::flow::Flow) by names.
///
/// ```
/// use rusty_p4_controller::flow;
/// use rusty_p4_controller::util::value::*;
///
/// let f = flow! {
///     table = "MyIngress.ipv4_lpm";
///     key = { "hdr.ipv4.dstAddr" => lpm("10.0.1.0", 24) };
///     action = "MyIngress.ipv4_forward";
///     params = { "port" => 2u32, "dstAddr" => "08:00:00:00:01:00" };
/// };
/// assert_eq!(f.table.matches.len(), 1);
/// assert_eq!(f.action.params.len(), 2);
/// ```
///
/// `params`, `priority` and `default_action` may be left out.
#[macro_export]
macro_rules! flow {
    (
        table = $table:expr;
        key = { $($field:expr => $value:expr),* $(,)? };
        action = $action:expr;
        $(params = { $($param:expr => $pvalue:expr),* $(,)? };)?
        $(priority = $priority:expr;)?
        $(default_action = $default:expr;)?
    ) => {{
        #[allow(unused_mut)]
        let mut matches = ::std::vec::Vec::new();
        $(
            matches.push($crate::util::flow::FlowMatch {
                name: ::std::string::ToString::to_string(&$field),
                value: $value,
            });
        )*
        #[allow(unused_mut)]
        let mut params = ::std::vec::Vec::new();
        $($(
            params.push($crate::util::flow::FlowActionParam {
                name: ::std::string::ToString::to_string(&$param),
                value: $crate::util::value::Value::from($pvalue),
            });
        )*)?
        #[allow(unused_mut, unused_assignments)]
        let mut priority: i32 = 0;
        $(priority = $priority;)?
        #[allow(unused_mut, unused_assignments)]
        let mut default_action = false;
        $(default_action = $default;)?
        $crate::util::flow::Flow {
            table: $crate::util::flow::FlowTable {
                name: ::std::string::ToString::to_string(&$table),
                matches,
            },
            action: $crate::util::flow::FlowAction {
                name: ::std::string::ToString::to_string(&$action),
                params,
            },
            priority,
            default_action,
        }
    }};
}
