use anyhow::Error;
use tokio_postgres::{types::ToSql, GenericClient, Row};

pub type Field = String;
pub type Value = (dyn ToSql + Sync);

/// A single `where`-clause comparison, parameter value borrowed from a
/// criteria enum produced by `entity!`.
pub enum QueryCondition<'a> {
    Eq(Field, &'a Value),
    Neq(Field, &'a Value),
    Gt(Field, &'a Value),
    Gte(Field, &'a Value),
    Lt(Field, &'a Value),
    Lte(Field, &'a Value),
    Like(Field, &'a Value),
    IsNull(Field),
    IsNotNull(Field),
}

impl<'a> QueryCondition<'a> {
    fn to_sql_fragment(&self, n: usize) -> String {
        match self {
            QueryCondition::Eq(f, _) => format!("{} = ${}", f, n),
            QueryCondition::Neq(f, _) => format!("{} != ${}", f, n),
            QueryCondition::Gt(f, _) => format!("{} > ${}", f, n),
            QueryCondition::Gte(f, _) => format!("{} >= ${}", f, n),
            QueryCondition::Lt(f, _) => format!("{} < ${}", f, n),
            QueryCondition::Lte(f, _) => format!("{} <= ${}", f, n),
            QueryCondition::Like(f, _) => format!("{} like ${}", f, n),
            QueryCondition::IsNull(f) => format!("{} is null", f),
            QueryCondition::IsNotNull(f) => format!("{} is not null", f),
        }
    }

    fn param(&self) -> Option<&'a Value> {
        match self {
            QueryCondition::Eq(_, p)
            | QueryCondition::Neq(_, p)
            | QueryCondition::Gt(_, p)
            | QueryCondition::Gte(_, p)
            | QueryCondition::Lt(_, p)
            | QueryCondition::Lte(_, p)
            | QueryCondition::Like(_, p) => Some(*p),
            QueryCondition::IsNull(_) | QueryCondition::IsNotNull(_) => None,
        }
    }
}

fn where_clause<'a>(conds: &'a [QueryCondition<'a>]) -> (String, Vec<&'a Value>) {
    let mut sql = String::new();
    let mut params: Vec<&'a Value> = vec![];
    for cond in conds {
        let fragment = cond.to_sql_fragment(params.len() + 1);
        if let Some(p) = cond.param() {
            params.push(p);
        }
        if sql.is_empty() {
            sql = format!(" where {}", fragment);
        } else {
            sql = format!("{} and {}", sql, fragment);
        }
    }
    (sql, params)
}

pub fn create_insert_sql(table: &str, id_field: &str, fields: &[String]) -> String {
    let fields_sql = fields
        .iter()
        .fold(id_field.to_string(), |acc, x| format!("{}, {}", acc, x));
    let placeholders = (2..fields.len() + 2)
        .fold("$1".to_string(), |acc, x| format!("{}, ${}", acc, x));
    format!(
        "insert into {} ({}) values ({})",
        table, fields_sql, placeholders
    )
}

pub fn create_update_sql(table: &str, id_field: &str, fields: &[String]) -> String {
    let assignments = fields
        .iter()
        .enumerate()
        .map(|(i, f)| format!("{} = ${}", f, i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "update {} set {} where {} = ${}",
        table,
        assignments,
        id_field,
        fields.len() + 1
    )
}

pub fn generate_select<'a>(
    table: &str,
    conds: &'a [QueryCondition<'a>],
) -> (String, Vec<&'a Value>) {
    let (where_sql, params) = where_clause(conds);
    (format!("select * from {}{}", table, where_sql), params)
}

pub async fn insert<C: GenericClient>(
    client: &C,
    table: &str,
    id_field: &str,
    fields: &[String],
    id_param: &Value,
    params: &[&Value],
) -> Result<(), Error> {
    let sql = create_insert_sql(table, id_field, fields);
    let stmt = client.prepare(&sql).await?;
    let all_params = [&[id_param], params].concat();
    client.execute(&stmt, all_params.as_slice()).await?;
    Ok(())
}

pub async fn update<C: GenericClient>(
    client: &C,
    table: &str,
    id_field: &str,
    fields: &[String],
    id_param: &Value,
    params: &[&Value],
) -> Result<(), Error> {
    let sql = create_update_sql(table, id_field, fields);
    let stmt = client.prepare(&sql).await?;
    let all_params = [params, &[id_param]].concat();
    client.execute(&stmt, all_params.as_slice()).await?;
    Ok(())
}

pub async fn select_one<C, F, A>(
    client: &C,
    table: &str,
    conds: &[QueryCondition<'_>],
    from_row: F,
) -> Result<Option<A>, Error>
where
    C: GenericClient,
    F: Fn(Row) -> A,
{
    let (sql, params) = generate_select(table, conds);
    let stmt = client.prepare(&sql).await?;
    let row_opt = client.query_opt(&stmt, params.as_slice()).await?;
    Ok(row_opt.map(from_row))
}

pub async fn select_all<C, F, A>(
    client: &C,
    table: &str,
    conds: &[QueryCondition<'_>],
    from_row: F,
) -> Result<Vec<A>, Error>
where
    C: GenericClient,
    F: Fn(Row) -> A,
{
    let (sql, params) = generate_select(table, conds);
    let stmt = client.prepare(&sql).await?;
    let rows = client.query(&stmt, params.as_slice()).await?;
    Ok(rows.into_iter().map(from_row).collect())
}

pub async fn delete<C: GenericClient>(
    client: &C,
    table: &str,
    conds: &[QueryCondition<'_>],
) -> Result<u64, Error> {
    let (where_sql, params) = where_clause(conds);
    let sql = format!("delete from {}{}", table, where_sql);
    let stmt = client.prepare(&sql).await?;
    let n = client.execute(&stmt, params.as_slice()).await?;
    Ok(n)
}

/// Declares a row-mapped entity: the struct itself, its field-name list for
/// SQL generation, a `from_row` constructor, a parameter vector for
/// insert/update (id excluded, always bound last or first by the helpers
/// above), and a `<Name>Criteria` enum whose variants borrow into
/// `QueryCondition`s.
macro_rules! entity {
    (
        $(#[$struct_meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field_name:ident : $field_type:ty
            ),*$(,)+
    }) => {

        $(#[$struct_meta])*
        pub struct $name {
            $(
                $(#[$field_meta])*
                pub $field_name : $field_type,
            )*
        }

        paste::paste! {
            #[derive(Debug)]
            pub enum [<$name Criteria>] {
                $([<$field_name:camel Eq>]($field_type)),*,
                $([<$field_name:camel Neq>]($field_type)),*,
                $([<$field_name:camel Gt>]($field_type)),*,
                $([<$field_name:camel Lt>]($field_type)),*,
                $([<$field_name:camel Like>]($field_type)),*,
            }

            impl [<$name Criteria>] {
                pub fn to_query_condition<'a>(&'a self) -> QueryCondition<'a> {
                    match self {
                        $([<$name Criteria>]::[<$field_name:camel Eq>](x) => QueryCondition::Eq(stringify!($field_name).to_string(), x)),*,
                        $([<$name Criteria>]::[<$field_name:camel Neq>](x) => QueryCondition::Neq(stringify!($field_name).to_string(), x)),*,
                        $([<$name Criteria>]::[<$field_name:camel Gt>](x) => QueryCondition::Gt(stringify!($field_name).to_string(), x)),*,
                        $([<$name Criteria>]::[<$field_name:camel Lt>](x) => QueryCondition::Lt(stringify!($field_name).to_string(), x)),*,
                        $([<$name Criteria>]::[<$field_name:camel Like>](x) => QueryCondition::Like(stringify!($field_name).to_string(), x)),*,
                    }
                }
            }
        }

        impl $name {

            pub fn field_names() -> &'static [&'static str] {
                static NAMES: &'static [&'static str] = &[$(stringify!($field_name)),*];
                NAMES
            }

            pub fn from_row(row: tokio_postgres::Row) -> $name {
                $(let $field_name: $field_type = row.get(stringify!($field_name));)*
                $name {
                    $($field_name),*
                }
            }

            pub fn to_params<'a>(&'a self) -> Vec<&'a (dyn tokio_postgres::types::ToSql + Sync + 'static)> {
                vec![
                    $(&self.$field_name as &(dyn tokio_postgres::types::ToSql + Sync + 'static)),*
                ][1..].to_vec()
            }
        }
    }
}

pub(crate) use entity;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_insert_sql() {
        let fields = vec!["email".to_string(), "role".to_string()];
        let sql = create_insert_sql("invites", "id", &fields);
        assert_eq!(sql, "insert into invites (id, email, role) values ($1, $2, $3)");
    }

    #[test]
    fn test_create_update_sql() {
        let fields = vec!["role".to_string(), "is_active".to_string()];
        let sql = create_update_sql("memberships", "id", &fields);
        assert_eq!(
            sql,
            "update memberships set role = $1, is_active = $2 where id = $3"
        );
    }

    #[test]
    fn test_generate_select_no_conditions() {
        let conds: Vec<QueryCondition> = vec![];
        let (sql, params) = generate_select("organizations", &conds);
        assert_eq!(sql, "select * from organizations");
        assert!(params.is_empty());
    }

    #[test]
    fn test_generate_select_numbers_params_in_order() {
        let email = "a@x.com".to_string();
        let accepted = false;
        let conds = vec![
            QueryCondition::Eq("email".to_string(), &email),
            QueryCondition::Eq("accepted".to_string(), &accepted),
        ];
        let (sql, params) = generate_select("invites", &conds);
        assert_eq!(
            sql,
            "select * from invites where email = $1 and accepted = $2"
        );
        assert_eq!(2, params.len());
    }

    #[test]
    fn test_null_conditions_consume_no_params() {
        let org = "o".to_string();
        let conds = vec![
            QueryCondition::IsNull("payment_id".to_string()),
            QueryCondition::Eq("org_id".to_string(), &org),
        ];
        let (sql, params) = generate_select("invites", &conds);
        assert_eq!(
            sql,
            "select * from invites where payment_id is null and org_id = $1"
        );
        assert_eq!(1, params.len());
    }
}
