//! Demo vocabulary, schema descriptions and few-shot examples for the
//! employees/departments/sales/projects schema.

use crate::application::use_cases::example_manager::{BulkAddReport, ExampleManager};
use crate::domain::error::Result;
use crate::domain::text2sql_entities::{
    ColumnDescription, Difficulty, QueryExampleInput, TableDescription, TermMapping,
};
use tracing::{info, warn};

use super::memory::InMemoryMetadataStore;
use super::repository::{PgText2SqlRepository, SeededTable};

/// Rows inserted by one seeding run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedReport {
    pub tables: usize,
    pub columns: usize,
    pub terms: usize,
    pub examples: usize,
}

fn term(
    business_term: &str,
    technical_terms: &[&str],
    synonyms: &[&str],
    category: &str,
    description: &str,
) -> Option<TermMapping> {
    match TermMapping::new(business_term, technical_terms) {
        Ok(mapping) => Some(
            mapping
                .with_synonyms(synonyms)
                .with_category(category)
                .with_description(description),
        ),
        Err(e) => {
            warn!("Skipping default term '{}': {}", business_term, e);
            None
        }
    }
}

pub fn default_term_mappings() -> Vec<TermMapping> {
    [
        term("직원", &["employees"], &["사원", "임직원", "employee"], "hr", "직원 테이블"),
        term(
            "급여",
            &["employees.salary"],
            &["연봉", "월급", "wage", "pay"],
            "hr",
            "직원 급여",
        ),
        term(
            "부서",
            &["departments", "employees.department_id"],
            &["부서명", "dept"],
            "hr",
            "부서 정보",
        ),
        term(
            "입사일",
            &["employees.hire_date"],
            &["채용일", "입사날짜"],
            "hr",
            "직원 입사일",
        ),
        term(
            "매출",
            &["sales.total_amount"],
            &["판매액", "매출액", "revenue"],
            "sales",
            "판매 금액",
        ),
        term(
            "고객",
            &["sales.customer_name"],
            &["구매자", "클라이언트", "client"],
            "sales",
            "고객 정보",
        ),
        term("주문", &["sales"], &["구매", "오더", "order"], "sales", "주문 정보"),
        term("지역", &["sales.region"], &["지방", "권역"], "sales", "판매 지역"),
        term("프로젝트", &["projects"], &["과제", "PJ"], "project", "프로젝트 정보"),
        term("예산", &["projects.budget"], &["비용"], "project", "프로젝트 예산"),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn table(
    table_name: &str,
    display_name: &str,
    description: &str,
    business_purpose: &str,
    related_tables: &[&str],
) -> TableDescription {
    TableDescription {
        table_name: table_name.to_string(),
        display_name: Some(display_name.to_string()),
        description: Some(description.to_string()),
        business_purpose: Some(business_purpose.to_string()),
        related_tables: related_tables.iter().map(|t| t.to_string()).collect(),
    }
}

pub fn default_table_descriptions() -> Vec<TableDescription> {
    vec![
        table(
            "employees",
            "직원",
            "직원 기본 정보",
            "인사 관리와 급여 분석",
            &["departments", "sales"],
        ),
        table(
            "departments",
            "부서",
            "조직의 부서 목록",
            "조직 구조 관리",
            &["employees", "projects"],
        ),
        table(
            "sales",
            "판매",
            "판매 거래 내역",
            "매출 및 지역별 실적 분석",
            &["employees"],
        ),
        table(
            "projects",
            "프로젝트",
            "부서별 프로젝트와 예산",
            "프로젝트 예산 관리",
            &["departments"],
        ),
    ]
}

struct ColumnSeed<'a> {
    table: &'a str,
    column: &'a str,
    data_type: &'a str,
    description: &'a str,
    meaning: &'a str,
    examples: &'a [&'a str],
    primary_key: bool,
    nullable: bool,
    related: &'a [&'a str],
}

impl From<ColumnSeed<'_>> for ColumnDescription {
    fn from(seed: ColumnSeed<'_>) -> Self {
        Self {
            table_name: seed.table.to_string(),
            column_name: seed.column.to_string(),
            display_name: None,
            description: Some(seed.description.to_string()),
            business_meaning: Some(seed.meaning.to_string()),
            data_type: Some(seed.data_type.to_string()),
            is_nullable: Some(seed.nullable),
            is_primary_key: seed.primary_key,
            example_values: seed.examples.iter().map(|v| v.to_string()).collect(),
            related_columns: seed.related.iter().map(|c| c.to_string()).collect(),
        }
    }
}

pub fn default_column_descriptions() -> Vec<ColumnDescription> {
    let seeds = [
        ColumnSeed {
            table: "employees",
            column: "employee_id",
            data_type: "integer",
            description: "직원 고유 식별자",
            meaning: "각 직원을 구분하는 유일한 번호",
            examples: &["1", "2", "3"],
            primary_key: true,
            nullable: false,
            related: &["sales.employee_id"],
        },
        ColumnSeed {
            table: "employees",
            column: "name",
            data_type: "character varying",
            description: "직원 이름",
            meaning: "직원의 전체 이름",
            examples: &["김철수", "이영희", "박민수"],
            primary_key: false,
            nullable: false,
            related: &[],
        },
        ColumnSeed {
            table: "employees",
            column: "salary",
            data_type: "numeric",
            description: "직원 연봉",
            meaning: "연간 급여 (원 단위)",
            examples: &["5000000", "6500000", "7000000"],
            primary_key: false,
            nullable: true,
            related: &[],
        },
        ColumnSeed {
            table: "employees",
            column: "hire_date",
            data_type: "date",
            description: "입사일",
            meaning: "직원이 회사에 입사한 날짜",
            examples: &["2020-01-15", "2019-03-01", "2021-06-10"],
            primary_key: false,
            nullable: true,
            related: &[],
        },
        ColumnSeed {
            table: "employees",
            column: "department_id",
            data_type: "integer",
            description: "소속 부서 ID",
            meaning: "직원이 속한 부서의 식별자",
            examples: &["1", "2", "3"],
            primary_key: false,
            nullable: true,
            related: &["departments.department_id"],
        },
        ColumnSeed {
            table: "departments",
            column: "department_id",
            data_type: "integer",
            description: "부서 고유 식별자",
            meaning: "각 부서를 구분하는 유일한 번호",
            examples: &["1", "2", "3"],
            primary_key: true,
            nullable: false,
            related: &["employees.department_id", "projects.department_id"],
        },
        ColumnSeed {
            table: "departments",
            column: "department_name",
            data_type: "character varying",
            description: "부서 이름",
            meaning: "부서의 공식 명칭",
            examples: &["개발팀", "영업팀", "마케팅팀"],
            primary_key: false,
            nullable: false,
            related: &[],
        },
        ColumnSeed {
            table: "sales",
            column: "sale_id",
            data_type: "integer",
            description: "판매 고유 식별자",
            meaning: "각 판매 건을 구분하는 유일한 번호",
            examples: &["1", "2", "3"],
            primary_key: true,
            nullable: false,
            related: &[],
        },
        ColumnSeed {
            table: "sales",
            column: "employee_id",
            data_type: "integer",
            description: "담당 직원 ID",
            meaning: "판매를 담당한 직원",
            examples: &["1", "4", "7"],
            primary_key: false,
            nullable: true,
            related: &["employees.employee_id"],
        },
        ColumnSeed {
            table: "sales",
            column: "customer_name",
            data_type: "character varying",
            description: "고객 이름",
            meaning: "구매한 고객 또는 회사",
            examples: &["한빛상사", "누리전자"],
            primary_key: false,
            nullable: true,
            related: &[],
        },
        ColumnSeed {
            table: "sales",
            column: "total_amount",
            data_type: "numeric",
            description: "판매 총액",
            meaning: "해당 판매 건의 총 금액 (원 단위)",
            examples: &["100000", "250000", "500000"],
            primary_key: false,
            nullable: false,
            related: &[],
        },
        ColumnSeed {
            table: "sales",
            column: "sale_date",
            data_type: "date",
            description: "판매 일자",
            meaning: "상품이 판매된 날짜",
            examples: &["2024-01-15", "2024-02-20", "2024-03-10"],
            primary_key: false,
            nullable: true,
            related: &[],
        },
        ColumnSeed {
            table: "sales",
            column: "region",
            data_type: "character varying",
            description: "판매 지역",
            meaning: "상품이 판매된 지역",
            examples: &["서울", "부산", "대구"],
            primary_key: false,
            nullable: true,
            related: &[],
        },
        ColumnSeed {
            table: "projects",
            column: "project_id",
            data_type: "integer",
            description: "프로젝트 고유 식별자",
            meaning: "각 프로젝트를 구분하는 유일한 번호",
            examples: &["1", "2"],
            primary_key: true,
            nullable: false,
            related: &[],
        },
        ColumnSeed {
            table: "projects",
            column: "project_name",
            data_type: "character varying",
            description: "프로젝트 이름",
            meaning: "프로젝트의 공식 명칭",
            examples: &["차세대 ERP", "모바일 앱 개편"],
            primary_key: false,
            nullable: false,
            related: &[],
        },
        ColumnSeed {
            table: "projects",
            column: "department_id",
            data_type: "integer",
            description: "주관 부서 ID",
            meaning: "프로젝트를 맡은 부서",
            examples: &["1", "3"],
            primary_key: false,
            nullable: true,
            related: &["departments.department_id"],
        },
        ColumnSeed {
            table: "projects",
            column: "budget",
            data_type: "numeric",
            description: "프로젝트 예산",
            meaning: "배정된 총 예산 (원 단위)",
            examples: &["50000000", "120000000"],
            primary_key: false,
            nullable: true,
            related: &[],
        },
    ];
    seeds.into_iter().map(ColumnDescription::from).collect()
}

pub fn default_examples() -> Vec<QueryExampleInput> {
    use Difficulty::{Easy, Medium};
    vec![
        QueryExampleInput::new("모든 직원을 보여주세요", "SELECT * FROM employees;")
            .with_category("select")
            .with_difficulty(Easy)
            .with_tags(&["basic", "employees"]),
        QueryExampleInput::new("모든 부서를 보여주세요", "SELECT * FROM departments;")
            .with_category("select")
            .with_difficulty(Easy)
            .with_tags(&["basic", "departments"]),
        QueryExampleInput::new(
            "급여가 6000000보다 큰 직원을 보여주세요",
            "SELECT * FROM employees WHERE salary > 6000000;",
        )
        .with_category("filter")
        .with_difficulty(Easy)
        .with_tags(&["filter", "employees", "salary"]),
        QueryExampleInput::new(
            "2020년 이후에 입사한 직원을 보여주세요",
            "SELECT * FROM employees WHERE hire_date > '2020-01-01';",
        )
        .with_category("filter")
        .with_difficulty(Easy)
        .with_tags(&["filter", "employees", "date"]),
        QueryExampleInput::new(
            "직원 이름과 소속 부서명을 보여주세요",
            "SELECT e.name, d.department_name\n\
             FROM employees e\n\
             JOIN departments d ON e.department_id = d.department_id;",
        )
        .with_category("join")
        .with_difficulty(Medium)
        .with_tags(&["join", "employees", "departments"]),
        QueryExampleInput::new(
            "부서별 평균 급여를 계산해주세요",
            "SELECT d.department_name, AVG(e.salary) AS avg_salary\n\
             FROM employees e\n\
             JOIN departments d ON e.department_id = d.department_id\n\
             GROUP BY d.department_name;",
        )
        .with_category("aggregation")
        .with_difficulty(Medium)
        .with_tags(&["aggregation", "join", "salary"]),
        QueryExampleInput::new(
            "각 부서의 직원 수를 세어주세요",
            "SELECT d.department_name, COUNT(*) AS employee_count\n\
             FROM employees e\n\
             JOIN departments d ON e.department_id = d.department_id\n\
             GROUP BY d.department_name;",
        )
        .with_category("aggregation")
        .with_difficulty(Medium)
        .with_tags(&["aggregation", "count", "departments"]),
        QueryExampleInput::new(
            "급여가 가장 높은 5명의 직원을 보여주세요",
            "SELECT * FROM employees ORDER BY salary DESC LIMIT 5;",
        )
        .with_category("sort")
        .with_difficulty(Easy)
        .with_tags(&["sort", "limit", "salary"]),
        QueryExampleInput::new(
            "마케팅 부서의 총 급여는 얼마인가요?",
            "SELECT SUM(e.salary) AS total_salary\n\
             FROM employees e\n\
             JOIN departments d ON e.department_id = d.department_id\n\
             WHERE d.department_name = '마케팅팀';",
        )
        .with_category("aggregation")
        .with_difficulty(Medium)
        .with_tags(&["aggregation", "filter", "join"]),
        QueryExampleInput::new(
            "지역별 총 매출을 보여주세요",
            "SELECT region, SUM(total_amount) AS total_sales\n\
             FROM sales\n\
             GROUP BY region\n\
             ORDER BY total_sales DESC;",
        )
        .with_category("aggregation")
        .with_difficulty(Medium)
        .with_tags(&["aggregation", "sales", "sort"]),
    ]
}

fn log_bulk_failures(report: &BulkAddReport) {
    for (index, reason) in &report.failed {
        warn!("Default example {} was not seeded: {}", index, reason);
    }
}

/// Fills each metadata table and the example bank with the defaults, but
/// only when that table is still empty. Existing curation is never touched.
pub async fn seed_postgres(
    repo: &PgText2SqlRepository,
    examples: &ExampleManager,
) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    if repo.count_rows(SeededTable::TableDescriptions).await? == 0 {
        for table in default_table_descriptions() {
            repo.upsert_table_description(&table).await?;
            report.tables += 1;
        }
    }

    if repo.count_rows(SeededTable::ColumnDescriptions).await? == 0 {
        for column in default_column_descriptions() {
            repo.upsert_column_description(&column).await?;
            report.columns += 1;
        }
    }

    if repo.count_rows(SeededTable::TermMappings).await? == 0 {
        for mapping in default_term_mappings() {
            repo.insert_term_mapping(&mapping).await?;
            report.terms += 1;
        }
    }

    if repo.count_rows(SeededTable::QueryExamples).await? == 0 {
        let added = examples.add_examples(&default_examples()).await;
        log_bulk_failures(&added);
        report.examples = added.added.len();
    }

    info!(
        "Seeded defaults: {} tables, {} columns, {} terms, {} examples",
        report.tables, report.columns, report.terms, report.examples
    );
    Ok(report)
}

/// Loads the defaults into process-local stores.
pub async fn seed_in_memory(
    metadata: &InMemoryMetadataStore,
    examples: &ExampleManager,
) -> SeedReport {
    let tables = default_table_descriptions();
    let columns = default_column_descriptions();
    let terms = default_term_mappings();
    let report = SeedReport {
        tables: tables.len(),
        columns: columns.len(),
        terms: terms.len(),
        examples: 0,
    };

    tables.into_iter().for_each(|t| metadata.add_table(t));
    columns.into_iter().for_each(|c| metadata.add_column(c));
    terms.into_iter().for_each(|t| metadata.add_term(t));

    let added = examples.add_examples(&default_examples()).await;
    log_bulk_failures(&added);
    SeedReport {
        examples: added.added.len(),
        ..report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::sql_validator::check_read_only;
    use crate::application::use_cases::term_mapper::TermMapper;
    use crate::domain::ports::{ExampleBank, MetadataStore, TableScope};
    use crate::infrastructure::db::memory::InMemoryExampleBank;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn described_tables() -> BTreeSet<String> {
        default_table_descriptions()
            .into_iter()
            .map(|t| t.table_name)
            .collect()
    }

    #[test]
    fn test_default_terms_are_valid() {
        let terms = default_term_mappings();
        assert_eq!(terms.len(), 10);
        for mapping in &terms {
            assert!(mapping.check().is_ok(), "{}", mapping.business_term);
        }
    }

    #[test]
    fn test_default_terms_point_at_described_tables() {
        let tables = described_tables();
        for mapping in default_term_mappings() {
            for technical in &mapping.technical_terms {
                let table = technical.split('.').next().unwrap_or_default();
                assert!(tables.contains(table), "{} -> {}", mapping.business_term, technical);
            }
        }
    }

    #[test]
    fn test_default_columns_belong_to_described_tables() {
        let tables = described_tables();
        for column in default_column_descriptions() {
            assert!(tables.contains(&column.table_name), "{}", column.table_name);
        }
    }

    #[test]
    fn test_default_examples_are_read_only() {
        for example in default_examples() {
            assert!(
                check_read_only(&example.sql_query).is_ok(),
                "{}",
                example.natural_language_query
            );
        }
    }

    #[tokio::test]
    async fn test_seed_in_memory_populates_every_store() {
        let metadata = InMemoryMetadataStore::default();
        let bank = Arc::new(InMemoryExampleBank::default());
        let manager = ExampleManager::new(bank.clone());

        let report = seed_in_memory(&metadata, &manager).await;
        assert_eq!(report.tables, 4);
        assert_eq!(report.terms, 10);
        assert_eq!(report.examples, 10);
        assert_eq!(bank.len(), 10);

        let tables = metadata.table_descriptions(&TableScope::All).await.unwrap();
        assert_eq!(tables.len(), 4);

        let mapper = TermMapper::load(&metadata).await.unwrap();
        assert_eq!(mapper.len(), 10);
        let annotation = mapper.annotate("부서별 평균 급여");
        assert!(annotation.referenced_tables().contains("employees"));

        let categories = bank.categories().await.unwrap();
        assert!(categories.contains(&"aggregation".to_string()));
    }
}
